use serde::Serialize;
use serde::ser::SerializeMap;

/// The twelve fields the model is asked to fill, in prompt order.
pub const SCHEMA_FIELDS: [&str; 12] = [
    "first_author",
    "pub_year",
    "journal",
    "corresponding_author_country",
    "funding_source",
    "conflicts",
    "eligibility_criteria",
    "participant_countries",
    "n_included",
    "females_percentage",
    "trial_arms",
    "group_descriptions",
];

/// Column added by the orchestrator after a successful extraction.
pub const FILENAME_FIELD: &str = "filename";

/// Sentinel the prompt asks the model to use for missing information.
pub const NOT_REPORTED: &str = "Not reported";

/// Canonical export columns: the schema fields followed by `filename`.
pub fn default_columns() -> Vec<&'static str> {
    SCHEMA_FIELDS
        .iter()
        .copied()
        .chain(std::iter::once(FILENAME_FIELD))
        .collect()
}

/// One extracted paper: string-valued fields in the order the model emitted them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedRecord {
    fields: Vec<(String, String)>,
}

impl ExtractedRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field, replacing the value in place if the name already exists.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some(slot) => slot.1 = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Field names in insertion order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(n, _)| n.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn filename(&self) -> Option<&str> {
        self.get(FILENAME_FIELD)
    }

    /// Attach the source file name. Always lands after the schema fields.
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.fields.retain(|(n, _)| n != FILENAME_FIELD);
        self.fields.push((FILENAME_FIELD.to_string(), filename.into()));
        self
    }

    /// Typed view of `funding_source`, if present.
    pub fn funding_source(&self) -> Option<FundingSource> {
        self.get("funding_source").map(FundingSource::classify)
    }
}

impl FromIterator<(String, String)> for ExtractedRecord {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        let mut record = ExtractedRecord::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl Serialize for ExtractedRecord {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Funding categories the prompt restricts `funding_source` to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FundingSource {
    Industry,
    NonIndustry,
    Combined,
    NoFunding,
    NotReported,
    /// Anything the model returned outside the allowed set, kept verbatim.
    Other(String),
}

impl FundingSource {
    /// Map a raw value onto a category. Comparison ignores case and
    /// surrounding whitespace; hyphens and spaces are interchangeable.
    pub fn classify(raw: &str) -> Self {
        let normalized: String = raw
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c == '-' { ' ' } else { c })
            .collect();
        match normalized.as_str() {
            "industry" => Self::Industry,
            "non industry" => Self::NonIndustry,
            "combined" => Self::Combined,
            "no funding" => Self::NoFunding,
            "not reported" => Self::NotReported,
            _ => Self::Other(raw.to_string()),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, Self::Other(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Industry => "Industry",
            Self::NonIndustry => "Non-industry",
            Self::Combined => "Combined",
            Self::NoFunding => "No funding",
            Self::NotReported => NOT_REPORTED,
            Self::Other(s) => s,
        }
    }
}

impl std::fmt::Display for FundingSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
