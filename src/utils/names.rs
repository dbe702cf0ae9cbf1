//! Fresh-name generation for rewrites that introduce iterators, buffers or
//! labels.

use std::collections::HashSet;

/// Hands out names that do not clash with any name reserved so far.
#[derive(Debug, Clone, Default)]
pub struct NameGen {
    used: HashSet<String>,
}

impl NameGen {
    pub fn new<I, S>(used: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { used: used.into_iter().map(Into::into).collect() }
    }

    /// `base` itself if unused, otherwise the first free `base.N`.
    pub fn fresh(&mut self, base: &str) -> String {
        if self.used.insert(base.to_string()) {
            return base.to_string();
        }
        let mut n = 1usize;
        loop {
            let candidate = format!("{}.{}", base, n);
            if self.used.insert(candidate.clone()) {
                return candidate;
            }
            n += 1;
        }
    }

    pub fn reserve(&mut self, name: impl Into<String>) {
        self.used.insert(name.into());
    }

    pub fn contains(&self, name: &str) -> bool {
        self.used.contains(name)
    }
}
