//! trawler CLI 라이브러리
//!
//! 바이너리(`trawler`)와 통합 테스트가 같은 명령 처리기를 공유하도록 모듈을 노출합니다.
//!
//! # Module Structure
//!
//! - [`cli`]: clap 인자 정의
//! - [`commands`]: 서브커맨드 처리기
//! - [`error`]: CLI 에러와 종료 코드
//! - [`logging`]: tracing 초기화
//! - [`output`]: text/JSON 출력 추상화

pub mod cli;
pub mod commands;
pub mod error;
pub mod logging;
pub mod output;
