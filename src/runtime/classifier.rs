//! Recognising the old-generation pool.
use super::MemoryType;

/// Decides whether a memory pool is the runtime's old (tenured) generation.
pub trait PoolClassifier: Send + Sync {
    fn is_old_gen(&self, name: &str, memory_type: MemoryType) -> bool;
}

impl<F> PoolClassifier for F
where
    F: Fn(&str, MemoryType) -> bool + Send + Sync,
{
    fn is_old_gen(&self, name: &str, memory_type: MemoryType) -> bool {
        self(name, memory_type)
    }
}

/// Matches heap pools whose name ends with one of a set of suffixes.
///
/// The default suffixes cover the usual collector naming: `"PS Old Gen"`,
/// `"G1 Old Gen"`, `"CMS Old Gen"` and the serial collector's `"Tenured Gen"`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuffixClassifier {
    suffixes: Vec<String>,
}

impl SuffixClassifier {
    pub const DEFAULT_SUFFIXES: [&'static str; 2] = ["Old Gen", "Tenured Gen"];

    pub fn new<I, S>(suffixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            suffixes: suffixes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn suffixes(&self) -> &[String] {
        &self.suffixes
    }
}

impl Default for SuffixClassifier {
    fn default() -> Self {
        Self::new(Self::DEFAULT_SUFFIXES)
    }
}

impl PoolClassifier for SuffixClassifier {
    fn is_old_gen(&self, name: &str, memory_type: MemoryType) -> bool {
        memory_type == MemoryType::Heap && self.suffixes.iter().any(|s| name.ends_with(s.as_str()))
    }
}
