use serde::{Deserialize, Serialize};

/// Flat, global tag.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Label {
    pub id: String,
    pub name: String,
    pub color: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewLabel {
    pub name: String,
    pub color: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelPatch {
    pub name: Option<String>,
    pub color: Option<String>,
    pub description: Option<Option<String>>,
}

impl LabelPatch {
    pub fn apply(&self, label: &mut Label) {
        if let Some(name) = &self.name {
            label.name = name.clone();
        }
        if let Some(color) = &self.color {
            label.color = color.clone();
        }
        if let Some(description) = &self.description {
            label.description = description.clone();
        }
    }
}

/// Vocabulary seeded into an empty store.
pub fn default_labels() -> Vec<Label> {
    [
        ("label-1", "Bug", "#ef4444", "Bug fixes and issues"),
        ("label-2", "Feature", "#10b981", "New features"),
        ("label-3", "Enhancement", "#3b82f6", "Improvements"),
        ("label-4", "Documentation", "#8b5cf6", "Docs updates"),
        ("label-5", "Urgent", "#f59e0b", "Needs immediate attention"),
        ("label-6", "Research", "#ec4899", "Research tasks"),
    ]
    .into_iter()
    .map(|(id, name, color, description)| Label {
        id: id.to_string(),
        name: name.to_string(),
        color: color.to_string(),
        description: Some(description.to_string()),
    })
    .collect()
}
