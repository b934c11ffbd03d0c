//! Locale analyzer - unicode word split + snowball stemming / 词法分析器
//!
//! The same analyzer runs at index time and at query time, so a query term
//! and a document term always stem to the same lexeme. / 索引与查询共用。

use rust_stemmers::{Algorithm, Stemmer};

/// Lexemes longer than this are dropped from the index / 超长词素丢弃
const MAX_LEXEME_CHARS: usize = 64;

/// Text analyzer for one configured locale / 单一语言配置的分析器
#[derive(Clone)]
pub struct Analyzer {
    locale: String,
}

impl Analyzer {
    pub fn new(locale: &str) -> Self {
        Self {
            locale: locale.to_string(),
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    /// Snowball algorithm for the locale; unknown names fall back to
    /// russian / 未知语言回退到俄语
    fn algorithm(&self) -> Algorithm {
        match self.locale.as_str() {
            "arabic" => Algorithm::Arabic,
            "danish" => Algorithm::Danish,
            "dutch" => Algorithm::Dutch,
            "english" => Algorithm::English,
            "finnish" => Algorithm::Finnish,
            "french" => Algorithm::French,
            "german" => Algorithm::German,
            "greek" => Algorithm::Greek,
            "hungarian" => Algorithm::Hungarian,
            "italian" => Algorithm::Italian,
            "norwegian" => Algorithm::Norwegian,
            "portuguese" => Algorithm::Portuguese,
            "romanian" => Algorithm::Romanian,
            "russian" => Algorithm::Russian,
            "spanish" => Algorithm::Spanish,
            "swedish" => Algorithm::Swedish,
            "tamil" => Algorithm::Tamil,
            "turkish" => Algorithm::Turkish,
            other => {
                tracing::warn!("Unknown stemming locale '{}', falling back to russian", other);
                Algorithm::Russian
            }
        }
    }

    /// Split text into stemmed lowercase lexemes / 切分并词干化
    ///
    /// Word boundaries are runs of non-alphanumeric characters, so formula
    /// bodies like `e^{i\pi}` still yield their symbol tokens.
    pub fn tokens(&self, text: &str) -> Vec<String> {
        let stemmer = Stemmer::create(self.algorithm());
        let mut tokens = Vec::new();

        for word in text.split(|c: char| !c.is_alphanumeric()) {
            if word.is_empty() {
                continue;
            }

            let lower = word.to_lowercase();
            if lower.chars().count() > MAX_LEXEME_CHARS {
                continue;
            }

            let stemmed = stemmer.stem(&lower).to_string();
            if !stemmed.is_empty() {
                tokens.push(stemmed);
            }
        }

        tokens
    }
}
