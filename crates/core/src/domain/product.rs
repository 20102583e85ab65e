use serde::{Deserialize, Serialize};

/// Unstructured product text indexed for retrieval.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDocument {
    pub slug: String,
    pub name: String,
    pub price: String,
    pub body: String,
}

impl ProductDocument {
    /// Prefix attached to every indexed chunk so a passage always names the
    /// product it came from.
    pub fn heading(&self) -> String {
        format!("{} ({})", self.name.trim(), self.price.trim())
    }
}
