//! Web-search-style query parsing / 查询解析
//!
//! Accepts the user-facing query syntax: bare terms AND-combine, `"…"`
//! groups a phrase, a leading `-` negates the following term or phrase.
//! Terms run through the same analyzer as indexed text. / 与索引共用分析器。

use std::collections::BTreeSet;

use crate::search::tokenizer::Analyzer;

/// One AND-combined unit of the query / 查询中的一个与组合单元
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryGroup {
    pub negated: bool,
    /// Stemmed lexemes; more than one means phrase adjacency is required
    /// / 多于一个词素时要求短语相邻
    pub lexemes: Vec<String>,
    pub phrase: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedQuery {
    pub groups: Vec<QueryGroup>,
}

impl ParsedQuery {
    /// Parse the raw query text / 解析原始查询文本
    pub fn parse(text: &str, analyzer: &Analyzer) -> Self {
        let mut groups = Vec::new();
        let mut chars = text.chars().peekable();

        while let Some(&c) = chars.peek() {
            if c.is_whitespace() {
                chars.next();
                continue;
            }

            let mut negated = false;
            if c == '-' {
                chars.next();
                negated = true;
            }

            match chars.peek() {
                Some('"') => {
                    chars.next();
                    let mut quoted = String::new();
                    for c in chars.by_ref() {
                        if c == '"' {
                            break;
                        }
                        quoted.push(c);
                    }
                    let lexemes = analyzer.tokens(&quoted);
                    if !lexemes.is_empty() {
                        let phrase = lexemes.len() > 1;
                        groups.push(QueryGroup {
                            negated,
                            lexemes,
                            phrase,
                        });
                    }
                }
                Some(_) => {
                    let mut word = String::new();
                    while let Some(&c) = chars.peek() {
                        if c.is_whitespace() {
                            break;
                        }
                        word.push(c);
                        chars.next();
                    }
                    // A bare word can analyze to several lexemes (for
                    // example a formula); each is its own AND unit
                    // / 一个裸词可能产生多个词素
                    for lexeme in analyzer.tokens(&word) {
                        groups.push(QueryGroup {
                            negated,
                            lexemes: vec![lexeme],
                            phrase: false,
                        });
                    }
                }
                None => break,
            }
        }

        Self { groups }
    }

    /// All lexemes of non-negated groups / 非否定组的全部词素
    pub fn positive_lexemes(&self) -> BTreeSet<String> {
        self.groups
            .iter()
            .filter(|g| !g.negated)
            .flat_map(|g| g.lexemes.iter().cloned())
            .collect()
    }

    /// Single-lexeme negated groups (excludable in SQL) / 可在 SQL 排除的否定词
    pub fn negated_lexemes(&self) -> BTreeSet<String> {
        self.groups
            .iter()
            .filter(|g| g.negated && g.lexemes.len() == 1)
            .map(|g| g.lexemes[0].clone())
            .collect()
    }

    /// True when at least one positive lexeme survived analysis
    /// / 至少有一个正向词素
    pub fn has_positive(&self) -> bool {
        self.groups.iter().any(|g| !g.negated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> ParsedQuery {
        ParsedQuery::parse(text, &Analyzer::new("russian"))
    }

    #[test]
    fn test_bare_terms_and_combine() {
        let q = parse("music history");
        assert_eq!(q.groups.len(), 2);
        assert!(q.groups.iter().all(|g| !g.negated && !g.phrase));
        assert_eq!(
            q.positive_lexemes(),
            ["music".to_string(), "history".to_string()].into()
        );
    }

    #[test]
    fn test_quoted_phrase() {
        let q = parse("\"music history\" archive");
        assert_eq!(q.groups.len(), 2);
        assert!(q.groups[0].phrase);
        assert_eq!(q.groups[0].lexemes, vec!["music", "history"]);
        assert!(!q.groups[1].phrase);
    }

    #[test]
    fn test_quoted_single_word_is_plain() {
        let q = parse("\"music\"");
        assert_eq!(q.groups.len(), 1);
        assert!(!q.groups[0].phrase);
    }

    #[test]
    fn test_negation() {
        let q = parse("music -history -\"old archive\"");
        assert_eq!(q.groups.len(), 3);
        assert!(!q.groups[0].negated);
        assert!(q.groups[1].negated);
        assert!(q.groups[2].negated && q.groups[2].phrase);
        assert_eq!(q.negated_lexemes(), ["history".to_string()].into());
        assert!(q.has_positive());
    }

    #[test]
    fn test_formula_word_splits_into_lexemes() {
        let q = parse("e^{i\\pi}");
        let lexemes: Vec<&str> = q.groups.iter().map(|g| g.lexemes[0].as_str()).collect();
        assert_eq!(lexemes, vec!["e", "i", "pi"]);
    }

    #[test]
    fn test_punctuation_only_query_is_empty() {
        let q = parse("!!! ---");
        assert!(!q.has_positive());
        assert!(q.positive_lexemes().is_empty());
    }

    #[test]
    fn test_unterminated_quote_still_parses() {
        let q = parse("\"music history");
        assert_eq!(q.groups.len(), 1);
        assert_eq!(q.groups[0].lexemes, vec!["music", "history"]);
    }
}
