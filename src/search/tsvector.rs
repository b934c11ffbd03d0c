//! Weighted tokenized vector / 加权词素向量
//!
//! The derived `searchable_tsv_<locale>` column stores this vector in a
//! deterministic text form: lexemes sorted, positions ascending, each
//! position tagged with its tier weight, e.g. `'музык':1A,5B`. The column
//! is a pure function of `(text_a, text_b, text_c, locale)`, so re-indexing
//! unchanged tiers is byte-identical. / 向量是三层文本与语言的纯函数。

use std::collections::{BTreeMap, BTreeSet, HashSet};

use crate::search::tokenizer::Analyzer;

/// Tier weight, A highest / 层级权重，A 最高
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Weight {
    A,
    B,
    C,
}

impl Weight {
    pub const fn letter(self) -> char {
        match self {
            Weight::A => 'A',
            Weight::B => 'B',
            Weight::C => 'C',
        }
    }

    /// Rank contribution of one occurrence / 单次出现的权重值
    pub const fn value(self) -> f32 {
        match self {
            Weight::A => 1.0,
            Weight::B => 0.4,
            Weight::C => 0.2,
        }
    }

    pub const fn tier_index(self) -> usize {
        match self {
            Weight::A => 0,
            Weight::B => 1,
            Weight::C => 2,
        }
    }

    pub fn from_letter(c: char) -> Option<Self> {
        match c {
            'A' => Some(Weight::A),
            'B' => Some(Weight::B),
            'C' => Some(Weight::C),
            _ => None,
        }
    }
}

/// Lexeme → weighted positions, one continuous position space over the
/// three tiers (A, then B, then C) / 词素到加权位置的映射
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TsVector {
    lexemes: BTreeMap<String, Vec<(u32, Weight)>>,
}

impl TsVector {
    /// Build the vector from the three text tiers / 由三层文本构建向量
    pub fn from_tiers(text_a: &str, text_b: &str, text_c: &str, analyzer: &Analyzer) -> Self {
        let mut lexemes: BTreeMap<String, Vec<(u32, Weight)>> = BTreeMap::new();
        let mut position: u32 = 1;

        for (text, weight) in [
            (text_a, Weight::A),
            (text_b, Weight::B),
            (text_c, Weight::C),
        ] {
            for token in analyzer.tokens(text) {
                lexemes.entry(token).or_default().push((position, weight));
                position += 1;
            }
        }

        Self { lexemes }
    }

    pub fn is_empty(&self) -> bool {
        self.lexemes.is_empty()
    }

    pub fn lexeme_count(&self) -> usize {
        self.lexemes.len()
    }

    pub fn lexemes(&self) -> impl Iterator<Item = &str> {
        self.lexemes.keys().map(|s| s.as_str())
    }

    pub fn contains(&self, lexeme: &str) -> bool {
        self.lexemes.contains_key(lexeme)
    }

    pub fn positions(&self, lexeme: &str) -> Option<&[(u32, Weight)]> {
        self.lexemes.get(lexeme).map(|v| v.as_slice())
    }

    /// Total positions per tier (the tier lengths used for length
    /// normalization) / 每层的位置总数
    pub fn tier_lengths(&self) -> [u32; 3] {
        let mut lengths = [0u32; 3];
        for positions in self.lexemes.values() {
            for (_, weight) in positions {
                lengths[weight.tier_index()] += 1;
            }
        }
        lengths
    }

    /// Deterministic text form for the derived column / 派生列的文本形式
    pub fn to_text(&self) -> String {
        let mut entries = Vec::with_capacity(self.lexemes.len());
        for (lexeme, positions) in &self.lexemes {
            let escaped = lexeme.replace('\'', "''");
            let positions: Vec<String> = positions
                .iter()
                .map(|(pos, weight)| format!("{}{}", pos, weight.letter()))
                .collect();
            entries.push(format!("'{}':{}", escaped, positions.join(",")));
        }
        entries.join(" ")
    }

    /// Parse the text form back; `None` on malformed input / 解析文本形式
    pub fn parse(text: &str) -> Option<Self> {
        let mut lexemes: BTreeMap<String, Vec<(u32, Weight)>> = BTreeMap::new();

        for entry in text.split_whitespace() {
            let rest = entry.strip_prefix('\'')?;

            // Lexeme runs to the closing quote; doubled quotes are escapes
            // / 词素到闭合引号为止
            let mut lexeme = String::new();
            let mut chars = rest.chars();
            let tail: String;
            loop {
                match chars.next()? {
                    '\'' => match chars.clone().next() {
                        Some('\'') => {
                            chars.next();
                            lexeme.push('\'');
                        }
                        _ => {
                            tail = chars.collect();
                            break;
                        }
                    },
                    c => lexeme.push(c),
                }
            }

            let positions_text = tail.strip_prefix(':')?;
            let mut positions = Vec::new();
            for part in positions_text.split(',') {
                let weight = Weight::from_letter(part.chars().last()?)?;
                let digits = &part[..part.len() - 1];
                let pos: u32 = digits.parse().ok()?;
                positions.push((pos, weight));
            }

            if positions.is_empty() {
                return None;
            }
            lexemes.insert(lexeme, positions);
        }

        Some(Self { lexemes })
    }

    /// True when the lexemes occupy consecutive positions somewhere in the
    /// document / 词素序列在文档中连续出现
    pub fn contains_phrase(&self, phrase: &[String]) -> bool {
        if phrase.is_empty() {
            return false;
        }
        if phrase.len() == 1 {
            return self.contains(&phrase[0]);
        }

        let sets: Option<Vec<HashSet<u32>>> = phrase
            .iter()
            .map(|lexeme| {
                self.positions(lexeme)
                    .map(|ps| ps.iter().map(|(p, _)| *p).collect())
            })
            .collect();

        let sets = match sets {
            Some(sets) => sets,
            None => return false,
        };

        sets[0].iter().any(|start| {
            sets[1..]
                .iter()
                .enumerate()
                .all(|(k, set)| set.contains(&(start + k as u32 + 1)))
        })
    }

    /// Relevance of this document for a set of query lexemes / 相关度
    ///
    /// Per matched lexeme and tier: `weight × occurrences ÷ tier length`
    /// (length normalization applied per weighted tier), summed and mapped
    /// through `r/(r+1)` to a bounded [0,1) score. An exact tier-A match
    /// therefore outranks the same term inside a longer tier.
    pub fn rank(&self, query_lexemes: &BTreeSet<String>) -> f32 {
        let tier_lengths = self.tier_lengths();
        let mut raw = 0.0f32;

        for lexeme in query_lexemes {
            let positions = match self.positions(lexeme) {
                Some(positions) => positions,
                None => continue,
            };

            let mut occurrences = [0u32; 3];
            for (_, weight) in positions {
                occurrences[weight.tier_index()] += 1;
            }

            for weight in [Weight::A, Weight::B, Weight::C] {
                let tier = weight.tier_index();
                if occurrences[tier] > 0 && tier_lengths[tier] > 0 {
                    raw += weight.value() * occurrences[tier] as f32 / tier_lengths[tier] as f32;
                }
            }
        }

        raw / (1.0 + raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyzer() -> Analyzer {
        Analyzer::new("russian")
    }

    #[test]
    fn test_build_is_deterministic() {
        let a = TsVector::from_tiers("Google", "Google's website", "https://google.com", &analyzer());
        let b = TsVector::from_tiers("Google", "Google's website", "https://google.com", &analyzer());
        assert_eq!(a.to_text(), b.to_text());
    }

    #[test]
    fn test_text_form_roundtrip() {
        let built = TsVector::from_tiers("music history", "notes", "body text body", &analyzer());
        let text = built.to_text();
        let parsed = TsVector::parse(&text).unwrap();
        assert_eq!(built, parsed);
        assert_eq!(parsed.to_text(), text);
    }

    #[test]
    fn test_positions_span_tiers() {
        let tsv = TsVector::from_tiers("music", "everything related to music", "", &analyzer());
        let positions = tsv.positions("music").unwrap();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0], (1, Weight::A));
        assert_eq!(positions[1], (5, Weight::B));
        assert_eq!(tsv.tier_lengths(), [1, 4, 0]);
    }

    #[test]
    fn test_phrase_adjacency() {
        let tsv = TsVector::from_tiers("music history archive", "", "", &analyzer());
        let an = analyzer();
        assert!(tsv.contains_phrase(&an.tokens("music history")));
        assert!(tsv.contains_phrase(&an.tokens("history archive")));
        assert!(!tsv.contains_phrase(&an.tokens("music archive")));
        assert!(!tsv.contains_phrase(&an.tokens("history music")));
    }

    #[test]
    fn test_rank_is_bounded() {
        let tsv = TsVector::from_tiers("foo foo foo", "foo foo", "foo", &analyzer());
        let query: BTreeSet<String> = ["foo".to_string()].into();
        let score = tsv.rank(&query);
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn test_exact_tier_a_match_outranks_phrase_member() {
        let an = analyzer();
        // Tier A exactly the term vs. the term inside a two-word tier A
        let exact = TsVector::from_tiers("music", "everything related to music", "", &an);
        let partial = TsVector::from_tiers("music history", "", "", &an);

        let query: BTreeSet<String> = an.tokens("music").into_iter().collect();
        assert!(exact.rank(&query) >= partial.rank(&query));
    }

    #[test]
    fn test_unmatched_lexemes_do_not_score() {
        let tsv = TsVector::from_tiers("alpha", "", "", &analyzer());
        let query: BTreeSet<String> = ["beta".to_string()].into();
        assert_eq!(tsv.rank(&query), 0.0);
    }

    #[test]
    fn test_malformed_text_is_rejected() {
        assert!(TsVector::parse("'unterminated").is_none());
        assert!(TsVector::parse("'lex':").is_none());
        assert!(TsVector::parse("'lex':12X").is_none());
        assert!(TsVector::parse("no-quotes:1A").is_none());
        assert_eq!(TsVector::parse("").unwrap(), TsVector::default());
    }
}
