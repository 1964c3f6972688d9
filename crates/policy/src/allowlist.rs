//! Allow/deny list evaluation for templates and adapters.

/// Result of checking one item against a tier's lists.
#[derive(Debug, Clone, PartialEq)]
pub enum ListCheck {
    Allowed,
    Denied { item: String, reason: String },
}

impl ListCheck {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ListCheck::Allowed)
    }
}

/// Allow/deny list rules shared by templates and adapters.
pub struct AllowList;

impl AllowList {
    /// Check `item` against an allow list and a deny list.
    ///
    /// Rules:
    /// - A deny entry matching the item (or `"*"`) always denies
    /// - An empty allow list, or one containing `"*"`, allows everything else
    /// - Otherwise the item must be listed
    pub fn check(item: &str, allow: &[String], deny: &[String]) -> ListCheck {
        if deny.iter().any(|d| d == item || d == "*") {
            return ListCheck::Denied {
                item: item.into(),
                reason: format!("'{item}' is on the deny list"),
            };
        }

        if allow.is_empty() || allow.iter().any(|a| a == "*") {
            return ListCheck::Allowed;
        }

        if allow.iter().any(|a| a == item) {
            ListCheck::Allowed
        } else {
            ListCheck::Denied {
                item: item.into(),
                reason: format!(
                    "'{item}' not in allow list ({} entries configured)",
                    allow.len()
                ),
            }
        }
    }
}
