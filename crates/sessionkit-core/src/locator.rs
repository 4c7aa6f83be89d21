//! Arrangement locators (section markers)

use serde::Serialize;

use crate::ids::Id;
use crate::xml::Element;

/// A named position marker in the arrangement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Locator {
    pub id: Id,
    /// Position in beats
    pub time: f64,
    pub name: String,
    #[serde(skip)]
    pub extra: Vec<Element>,
}

impl Locator {
    pub fn new(id: Id, time: f64, name: impl Into<String>) -> Self {
        Self {
            id,
            time,
            name: name.into(),
            extra: Vec::new(),
        }
    }
}
