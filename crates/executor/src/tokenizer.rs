//! 따옴표 인식 공백 분리기
//!
//! 작은따옴표/큰따옴표를 지원하며 이스케이프는 처리하지 않습니다.
//! 인접한 따옴표 구간은 하나의 토큰으로 이어집니다 (`a"b c"d` -> `ab cd`).

use crate::error::ValidationError;

/// 명령 문자열을 토큰으로 분리합니다.
///
/// # Errors
///
/// 따옴표가 닫히지 않으면 [`ValidationError::UnterminatedQuote`]를 반환합니다.
pub fn tokenize(input: &str) -> Result<Vec<String>, ValidationError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_token = false;
    let mut quote: Option<char> = None;

    for c in input.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '\'' || c == '"' => {
                quote = Some(c);
                in_token = true;
            }
            None if c.is_whitespace() => {
                if in_token {
                    tokens.push(std::mem::take(&mut current));
                    in_token = false;
                }
            }
            None => {
                current.push(c);
                in_token = true;
            }
        }
    }

    if quote.is_some() {
        return Err(ValidationError::UnterminatedQuote);
    }
    if in_token {
        tokens.push(current);
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        assert_eq!(
            tokenize("nmap  -sV\t-p 80").unwrap(),
            vec!["nmap", "-sV", "-p", "80"]
        );
    }

    #[test]
    fn empty_input_has_no_tokens() {
        assert!(tokenize("").unwrap().is_empty());
        assert!(tokenize("   ").unwrap().is_empty());
    }

    #[test]
    fn double_quotes_group_words() {
        assert_eq!(
            tokenize(r#"nuclei -H "User-Agent: trawler""#).unwrap(),
            vec!["nuclei", "-H", "User-Agent: trawler"]
        );
    }

    #[test]
    fn single_quotes_keep_double_quotes() {
        assert_eq!(
            tokenize(r#"ffuf -mr 'say "hi"'"#).unwrap(),
            vec!["ffuf", "-mr", r#"say "hi""#]
        );
    }

    #[test]
    fn adjacent_segments_concatenate() {
        assert_eq!(tokenize(r#"a"b c"d"#).unwrap(), vec!["ab cd"]);
    }

    #[test]
    fn empty_quotes_produce_empty_token() {
        assert_eq!(tokenize(r#"hydra -p """#).unwrap(), vec!["hydra", "-p", ""]);
    }

    #[test]
    fn backslash_is_literal() {
        assert_eq!(tokenize(r"a\ b").unwrap(), vec![r"a\", "b"]);
    }

    #[test]
    fn unterminated_quote_is_error() {
        assert_eq!(
            tokenize(r#"nmap "10.0.0.1"#),
            Err(ValidationError::UnterminatedQuote)
        );
        assert_eq!(tokenize("nmap '"), Err(ValidationError::UnterminatedQuote));
    }
}
