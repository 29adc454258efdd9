//! Filter predicates and the ordered chain that decides node acceptance.
//!
//! A node is accepted when every predicate in the chain accepts it and its
//! parent is accepted. The store re-evaluates acceptance on insert and
//! update, and for the whole tree whenever the chain changes.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use nucleo_matcher::pattern::{AtomKind, CaseMatching, Normalization, Pattern};
use nucleo_matcher::{Config, Matcher, Utf32Str};
use regex::Regex;

/// A predicate over node data.
pub trait NodeFilter<T>: Send + Sync {
    /// Whether the item, attached at `depth` (1 for root-level items),
    /// passes this filter.
    fn accepts(&self, item: &T, depth: usize) -> bool;
}

/// Unique identifier for a filter registered in a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilterId(usize);

impl FilterId {
    fn new() -> Self {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        Self(COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl fmt::Display for FilterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "__filter_{}", self.0)
    }
}

/// Ordered set of predicates.
pub struct FilterChain<T> {
    filters: Vec<(FilterId, Arc<dyn NodeFilter<T>>)>,
}

impl<T> Default for FilterChain<T> {
    fn default() -> Self {
        Self {
            filters: Vec::new(),
        }
    }
}

impl<T> fmt::Debug for FilterChain<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.filters.iter().map(|(id, _)| id))
            .finish()
    }
}

impl<T> FilterChain<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a predicate.
    pub fn push(&mut self, filter: Arc<dyn NodeFilter<T>>) -> FilterId {
        let id = FilterId::new();
        self.filters.push((id, filter));
        id
    }

    /// Removes a predicate. Returns `false` if it was not in the chain.
    pub fn remove(&mut self, id: FilterId) -> bool {
        let before = self.filters.len();
        self.filters.retain(|(fid, _)| *fid != id);
        self.filters.len() != before
    }

    /// Removes every predicate.
    pub fn clear(&mut self) {
        self.filters.clear();
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    /// Whether every predicate accepts the item. An empty chain accepts
    /// everything.
    pub fn accepts(&self, item: &T, depth: usize) -> bool {
        self.filters.iter().all(|(_, f)| f.accepts(item, depth))
    }
}

/// Filter backed by a closure.
///
/// # Example
///
/// ```
/// use treeview::filter::{FnFilter, NodeFilter};
///
/// let only_even = FnFilter::new(|n: &u32, _depth| n % 2 == 0);
/// assert!(only_even.accepts(&4, 1));
/// assert!(!only_even.accepts(&3, 1));
/// ```
pub struct FnFilter<F> {
    predicate: F,
}

impl<F> FnFilter<F> {
    pub fn new<T>(predicate: F) -> Self
    where
        F: Fn(&T, usize) -> bool + Send + Sync,
    {
        Self { predicate }
    }
}

impl<T, F> NodeFilter<T> for FnFilter<F>
where
    F: Fn(&T, usize) -> bool + Send + Sync,
{
    fn accepts(&self, item: &T, depth: usize) -> bool {
        (self.predicate)(item, depth)
    }
}

type LabelFn<T> = Box<dyn Fn(&T) -> String + Send + Sync>;

/// Fuzzy text filter using nucleo-matcher.
///
/// Matches a caller-extracted label against the query, ignoring case. An
/// empty query accepts everything.
pub struct FuzzyFilter<T> {
    pattern: Option<Pattern>,
    matcher: Mutex<Matcher>,
    label: LabelFn<T>,
}

impl<T> FuzzyFilter<T> {
    /// Creates a fuzzy filter over the label returned by `label`.
    pub fn new(query: &str, label: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        let pattern = (!query.is_empty()).then(|| {
            Pattern::new(
                query,
                CaseMatching::Ignore,
                Normalization::Smart,
                AtomKind::Fuzzy,
            )
        });
        Self {
            pattern,
            matcher: Mutex::new(Matcher::new(Config::DEFAULT)),
            label: Box::new(label),
        }
    }

    /// Match score of `item`, `None` if it does not match.
    pub fn score(&self, item: &T) -> Option<u32> {
        let Some(pattern) = &self.pattern else {
            return Some(0);
        };
        let label = (self.label)(item);
        let mut buf = Vec::new();
        let haystack = Utf32Str::new(&label, &mut buf);
        let mut matcher = self.matcher.lock().unwrap_or_else(PoisonError::into_inner);
        pattern.score(haystack, &mut matcher)
    }
}

impl<T: Send + Sync> NodeFilter<T> for FuzzyFilter<T> {
    fn accepts(&self, item: &T, _depth: usize) -> bool {
        self.score(item).is_some()
    }
}

/// Regular expression filter over a caller-extracted label.
pub struct RegexFilter<T> {
    regex: Regex,
    label: LabelFn<T>,
}

impl<T> RegexFilter<T> {
    /// Compiles `pattern`; fails on invalid syntax.
    pub fn new(
        pattern: &str,
        label: impl Fn(&T) -> String + Send + Sync + 'static,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            regex: Regex::new(pattern)?,
            label: Box::new(label),
        })
    }
}

impl<T: Send + Sync> NodeFilter<T> for RegexFilter<T> {
    fn accepts(&self, item: &T, _depth: usize) -> bool {
        self.regex.is_match(&(self.label)(item))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn label(s: &&'static str) -> String {
        s.to_string()
    }

    #[test]
    fn test_empty_chain_accepts_everything() {
        let chain: FilterChain<u32> = FilterChain::new();
        assert!(chain.accepts(&1, 1));
    }

    #[test]
    fn test_chain_requires_all_predicates() {
        let mut chain: FilterChain<u32> = FilterChain::new();
        chain.push(Arc::new(FnFilter::new(|n: &u32, _| *n > 2)));
        let even = chain.push(Arc::new(FnFilter::new(|n: &u32, _| n % 2 == 0)));

        assert!(chain.accepts(&4, 1));
        assert!(!chain.accepts(&3, 1));
        assert!(!chain.accepts(&2, 1));

        assert!(chain.remove(even));
        assert!(!chain.remove(even));
        assert!(chain.accepts(&3, 1));
    }

    #[test]
    fn test_depth_is_passed_through() {
        let mut chain: FilterChain<u32> = FilterChain::new();
        chain.push(Arc::new(FnFilter::new(|_: &u32, depth| depth < 3)));
        assert!(chain.accepts(&0, 2));
        assert!(!chain.accepts(&0, 3));
    }

    #[test]
    fn test_fuzzy_filter() {
        let filter = FuzzyFilter::new("aplc", label);
        assert!(filter.accepts(&"Apple Cider", 1));
        assert!(!filter.accepts(&"banana", 1));

        let everything = FuzzyFilter::new("", label);
        assert!(everything.accepts(&"banana", 1));
    }

    #[test]
    fn test_regex_filter() {
        let filter = RegexFilter::new(r"^inbox/\d+$", label).unwrap();
        assert!(filter.accepts(&"inbox/42", 1));
        assert!(!filter.accepts(&"inbox/new", 1));
        assert!(RegexFilter::new("(", label).is_err());
    }
}
