use serde::{Deserialize, Serialize};

/// User-editable fields of a single item.
///
/// Every field defaults to empty so partially filled forms deserialize;
/// emptiness is reported by [`validate`](crate::validate), not by serde.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemData {
    pub name: String,
    pub url: String,
    pub description: String,
}

/// An item as held in the `items` cache, keyed by its assigned id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredItem {
    pub id: String,
    pub data: ItemData,
}
