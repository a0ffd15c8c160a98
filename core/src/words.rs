//! Word paths: the ordered lists of names that address a tool.

use crate::error::DefinitionError;

/// Returns `true` if `ch` may not appear in a tool name word.
fn is_illegal_char(ch: char) -> bool {
    ch.is_control()
        || ch.is_whitespace()
        || matches!(
            ch,
            '"' | '\'' | '`' | '\\' | '|' | '/' | '<' | '>' | ';' | '&' | '$' | '(' | ')' | '*' | '?'
        )
}

/// Validates a single tool name word.
///
/// # Examples
///
/// ```
/// use tooltree_core::validate_word;
///
/// assert!(validate_word("build").is_ok());
/// assert!(validate_word("ns:task").is_ok());
/// assert!(validate_word("a b").is_err());
/// assert!(validate_word("").is_err());
/// ```
pub fn validate_word(word: &str) -> Result<(), DefinitionError> {
    if word.is_empty() || word.chars().any(is_illegal_char) {
        return Err(DefinitionError::IllegalWord(word.to_string()));
    }
    Ok(())
}

/// Validates every word of a path.
pub fn validate_words<S: AsRef<str>>(words: &[S]) -> Result<(), DefinitionError> {
    words.iter().try_for_each(|word| validate_word(word.as_ref()))
}

/// Returns `true` for words hidden from listings by convention (leading
/// underscore).
pub fn is_hidden_word(word: &str) -> bool {
    word.starts_with('_')
}

/// Returns `true` if an argument looks like a flag rather than a name.
pub fn looks_like_flag(arg: &str) -> bool {
    arg.starts_with('-')
}

/// Splits the leading name words of `args` on any of the `delimiters`
/// characters, leaving flag-looking arguments and everything after them
/// untouched.
///
/// # Examples
///
/// ```
/// use tooltree_core::split_delimited;
///
/// let args = vec!["ns:build".to_string(), "--fast".to_string(), "a:b".to_string()];
/// assert_eq!(
///     split_delimited(&args, ":"),
///     vec!["ns", "build", "--fast", "a:b"],
/// );
/// ```
pub fn split_delimited<S: AsRef<str>>(args: &[S], delimiters: &str) -> Vec<String> {
    let mut result = Vec::with_capacity(args.len());
    let mut in_name = true;
    for arg in args {
        let arg = arg.as_ref();
        if in_name && looks_like_flag(arg) {
            in_name = false;
        }
        if in_name && !delimiters.is_empty() {
            result.extend(
                arg.split(|ch| delimiters.contains(ch))
                    .filter(|part| !part.is_empty())
                    .map(String::from),
            );
        } else {
            result.push(arg.to_string());
        }
    }
    result
}

/// Converts a data key such as `dry_run` to its flag form `dry-run`.
pub fn kebab_case(key: &str) -> String {
    key.replace('_', "-")
}

/// Joins a word path for display.
pub fn display_words<S: AsRef<str>>(words: &[S]) -> String {
    words
        .iter()
        .map(|word| word.as_ref())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Returns `true` if `prefix` is a prefix of (or equal to) `words`.
pub fn is_prefix<S: AsRef<str>, T: AsRef<str>>(prefix: &[S], words: &[T]) -> bool {
    prefix.len() <= words.len()
        && prefix
            .iter()
            .zip(words)
            .all(|(a, b)| a.as_ref() == b.as_ref())
}

/// Returns candidates within a small edit distance of `input`, closest
/// first.
pub fn suggest<I, S>(input: &str, candidates: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let input = input.to_lowercase();
    let mut scored: Vec<(usize, String)> = candidates
        .into_iter()
        .filter_map(|candidate| {
            let candidate = candidate.as_ref();
            let distance = strsim::levenshtein(&input, &candidate.to_lowercase());
            (distance <= 2 && distance < candidate.len()).then(|| (distance, candidate.to_string()))
        })
        .collect();
    scored.sort();
    scored.dedup_by(|a, b| a.1 == b.1);
    scored.into_iter().map(|(_, candidate)| candidate).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_illegal_words() {
        for word in ["", "a b", "a\tb", "a/b", "a;b", "x\"", "it's", "a|b", "\u{7}"] {
            assert!(validate_word(word).is_err(), "{word:?} should be illegal");
        }
        for word in ["build", "_hidden", "ns:task", "v1.2", "a-b", "a_b"] {
            assert!(validate_word(word).is_ok(), "{word:?} should be legal");
        }
    }

    #[test]
    fn test_split_delimited_without_delimiters() {
        let args = ["a:b", "c"];
        assert_eq!(split_delimited(&args, ""), vec!["a:b", "c"]);
    }

    #[test]
    fn test_split_delimited_drops_empty_fragments() {
        let args = ["a::b.c"];
        assert_eq!(split_delimited(&args, ":."), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_is_prefix() {
        assert!(is_prefix::<&str, &str>(&[], &["a"]));
        assert!(is_prefix(&["a"], &["a", "b"]));
        assert!(is_prefix(&["a", "b"], &["a", "b"]));
        assert!(!is_prefix(&["a", "c"], &["a", "b"]));
        assert!(!is_prefix(&["a", "b", "c"], &["a", "b"]));
    }

    #[test]
    fn test_kebab_case() {
        assert_eq!(kebab_case("dry_run"), "dry-run");
        assert_eq!(kebab_case("v"), "v");
    }

    #[test]
    fn test_suggest_close_names() {
        let names = ["build", "test", "bench", "clean"];
        assert_eq!(suggest("buidl", names), vec!["build"]);
        assert_eq!(suggest("tset", names), vec!["test"]);
        assert!(suggest("deploy", names).is_empty());
    }
}
