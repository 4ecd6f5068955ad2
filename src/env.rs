//! Case-insensitive view of the process environment

use std::collections::{hash_map::Entry, HashMap};

/// Immutable snapshot of environment variables, keyed by ASCII lower-cased name.
///
/// When the same name is set in several spellings (`HTTP_PROXY` and `http_proxy`),
/// the all-lowercase spelling wins; among the others the lexicographically smallest
/// name wins, so the result never depends on the order variables are listed in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    vars: HashMap<String, String>,
}

impl Environment {
    /// Read the live process environment once.
    ///
    /// Variables whose name or value is not valid unicode are skipped.
    pub fn snapshot() -> Self {
        Self::from_pairs(
            std::env::vars_os()
                .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?))),
        )
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        // folded name -> (spelling kept so far, value)
        let mut seen: HashMap<String, (String, String)> = HashMap::new();
        for (name, value) in pairs {
            let name = name.as_ref();
            match seen.entry(name.to_ascii_lowercase()) {
                Entry::Vacant(slot) => {
                    slot.insert((name.to_owned(), value.into()));
                }
                Entry::Occupied(mut slot) => {
                    if spelling_rank(name) < spelling_rank(&slot.get().0) {
                        slot.insert((name.to_owned(), value.into()));
                    }
                }
            }
        }
        let vars = seen
            .into_iter()
            .map(|(folded, (_, value))| (folded, value))
            .collect();
        Self { vars }
    }

    pub fn lookup(&self, name: &str) -> Option<&str> {
        self.vars
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Lowercase spelling first, then the lexicographically smallest name
fn spelling_rank(name: &str) -> (bool, &str) {
    (name.bytes().any(|b| b.is_ascii_uppercase()), name)
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for Environment {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self::from_pairs(iter)
    }
}
