use std::collections::BTreeMap;

pub const UNKNOWN_LABEL: &str = "Unknown";

/// Class id to name mapping, filled in as classes are observed.
///
/// Every detection is resolved through its own class id. Ids the model has no
/// name for resolve to `UNKNOWN_LABEL`.
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    model_names: Vec<String>,
    observed: BTreeMap<usize, String>,
}

impl LabelTable {
    pub fn new(model_names: &[String]) -> Self {
        Self {
            model_names: model_names.to_vec(),
            observed: BTreeMap::new(),
        }
    }

    /// Records a class id seen in the current frame and returns its name.
    pub fn observe(&mut self, class_id: usize) -> &str {
        let name = self
            .model_names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| UNKNOWN_LABEL.to_string());
        self.observed.entry(class_id).or_insert(name).as_str()
    }

    pub fn resolve(&self, class_id: usize) -> &str {
        self.observed
            .get(&class_id)
            .map(String::as_str)
            .or_else(|| self.model_names.get(class_id).map(String::as_str))
            .unwrap_or(UNKNOWN_LABEL)
    }

    /// Classes observed so far, in class id order.
    pub fn observed(&self) -> impl Iterator<Item = (usize, &str)> {
        self.observed.iter().map(|(id, name)| (*id, name.as_str()))
    }
}
