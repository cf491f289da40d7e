//! Column mapping and row validation for bulk card imports.
//!
//! Everything here is pure: a [`RawRow`] is built from whatever CSV record
//! the service read, then [`RawRow::validate`] turns it into a typed
//! [`CardDraft`] or the list of problems found.

use bigdecimal::BigDecimal;
use num_traits::Zero;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::DomainError;

/// Destination fields a CSV column can be mapped onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportField {
    CardName,
    SetName,
    CardNumber,
    Year,
    SportType,
    Condition,
    PriceNzd,
    Quantity,
    Description,
    PlayerName,
    Rarity,
    Graded,
    GradeCompany,
    GradeValue,
}

impl ImportField {
    pub const ALL: [ImportField; 14] = [
        ImportField::CardName,
        ImportField::SetName,
        ImportField::CardNumber,
        ImportField::Year,
        ImportField::SportType,
        ImportField::PlayerName,
        ImportField::Condition,
        ImportField::PriceNzd,
        ImportField::Quantity,
        ImportField::Rarity,
        ImportField::Graded,
        ImportField::GradeCompany,
        ImportField::GradeValue,
        ImportField::Description,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ImportField::CardName => "card_name",
            ImportField::SetName => "set_name",
            ImportField::CardNumber => "card_number",
            ImportField::Year => "year",
            ImportField::SportType => "sport_type",
            ImportField::Condition => "condition",
            ImportField::PriceNzd => "price_nzd",
            ImportField::Quantity => "quantity",
            ImportField::Description => "description",
            ImportField::PlayerName => "player_name",
            ImportField::Rarity => "rarity",
            ImportField::Graded => "graded",
            ImportField::GradeCompany => "grade_company",
            ImportField::GradeValue => "grade_value",
        }
    }
}

impl fmt::Display for ImportField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source column name per destination field. Fields without an override are
/// read from a column named after the field itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnMapping {
    overrides: HashMap<ImportField, String>,
}

impl ColumnMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style override. Blank column names are ignored.
    pub fn with(mut self, field: ImportField, column: impl Into<String>) -> Self {
        let column = column.into();
        if !column.trim().is_empty() {
            self.overrides.insert(field, column);
        }
        self
    }

    pub fn column_for(&self, field: ImportField) -> &str {
        self.overrides
            .get(&field)
            .map(String::as_str)
            .unwrap_or_else(|| field.as_str())
    }

    /// Maps one header/value record. Missing and empty values are omitted.
    pub fn map_record<'a, I>(&self, record: I) -> RawRow
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let source: HashMap<&str, &str> = record.into_iter().collect();
        let mut values = BTreeMap::new();
        for field in ImportField::ALL {
            if let Some(value) = source.get(self.column_for(field)) {
                if !value.is_empty() {
                    values.insert(field, value.to_string());
                }
            }
        }
        RawRow { values }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardCondition {
    Mint,
    NearMint,
    Excellent,
    Good,
    Played,
}

impl CardCondition {
    pub const ALL: [CardCondition; 5] = [
        CardCondition::Mint,
        CardCondition::NearMint,
        CardCondition::Excellent,
        CardCondition::Good,
        CardCondition::Played,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardCondition::Mint => "mint",
            CardCondition::NearMint => "near_mint",
            CardCondition::Excellent => "excellent",
            CardCondition::Good => "good",
            CardCondition::Played => "played",
        }
    }
}

impl FromStr for CardCondition {
    type Err = DomainError;

    /// Case-insensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.to_lowercase();
        CardCondition::ALL
            .into_iter()
            .find(|c| c.as_str() == lowered)
            .ok_or_else(|| DomainError::UnknownCondition(s.to_string()))
    }
}

fn parse_graded(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "true" | "yes" | "1" => Some(true),
        "false" | "no" | "0" => Some(false),
        _ => None,
    }
}

/// A mapped but unvalidated CSV row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRow {
    values: BTreeMap<ImportField, String>,
}

impl RawRow {
    pub fn get(&self, field: ImportField) -> Option<&str> {
        self.values.get(&field).map(String::as_str)
    }

    pub fn set(&mut self, field: ImportField, value: impl Into<String>) {
        self.values.insert(field, value.into());
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Runs every check and collects all failures, so one bad row reports
    /// everything wrong with it at once.
    pub fn validate(&self, current_year: i32) -> Result<CardDraft, Vec<String>> {
        let mut errors = Vec::new();

        let card_name = match self.get(ImportField::CardName).map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => {
                errors.push("Card name is required".to_string());
                String::new()
            }
        };

        let year = self.get(ImportField::Year).and_then(|raw| {
            match raw.trim().parse::<i32>() {
                Ok(year) if (1800..=current_year + 1).contains(&year) => Some(year),
                _ => {
                    errors.push(format!("Invalid year: {}", raw));
                    None
                }
            }
        });

        let price_nzd = self.get(ImportField::PriceNzd).and_then(|raw| {
            match BigDecimal::from_str(raw.trim()) {
                Ok(price) if price >= BigDecimal::zero() => Some(price),
                _ => {
                    errors.push(format!("Invalid price: {}", raw));
                    None
                }
            }
        });

        let quantity = self.get(ImportField::Quantity).and_then(|raw| {
            match raw.trim().parse::<i32>() {
                Ok(quantity) if quantity >= 0 => Some(quantity),
                _ => {
                    errors.push(format!("Invalid quantity: {}", raw));
                    None
                }
            }
        });

        let condition = self.get(ImportField::Condition).and_then(|raw| {
            match raw.trim().parse::<CardCondition>() {
                Ok(condition) => Some(condition),
                Err(_) => {
                    let allowed: Vec<&str> =
                        CardCondition::ALL.iter().map(CardCondition::as_str).collect();
                    errors.push(format!(
                        "Invalid condition: {}. Must be one of: {}",
                        raw,
                        allowed.join(", ")
                    ));
                    None
                }
            }
        });

        let graded = self.get(ImportField::Graded).and_then(|raw| {
            let parsed = parse_graded(raw.trim());
            if parsed.is_none() {
                errors.push(format!("Invalid graded value: {}", raw));
            }
            parsed
        });

        if !errors.is_empty() {
            return Err(errors);
        }

        let text = |field| self.get(field).map(|v: &str| v.to_string());

        Ok(CardDraft {
            card_name,
            set_name: text(ImportField::SetName),
            card_number: text(ImportField::CardNumber),
            year,
            sport_type: text(ImportField::SportType),
            condition,
            price_nzd,
            quantity,
            description: text(ImportField::Description),
            player_name: text(ImportField::PlayerName),
            rarity: text(ImportField::Rarity),
            graded,
            grade_company: text(ImportField::GradeCompany),
            grade_value: text(ImportField::GradeValue),
        })
    }

    /// Raw values keyed by field name, kept in error logs.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A validated import row. `None` means the CSV did not supply the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardDraft {
    pub card_name: String,
    pub set_name: Option<String>,
    pub card_number: Option<String>,
    pub year: Option<i32>,
    pub sport_type: Option<String>,
    pub condition: Option<CardCondition>,
    pub price_nzd: Option<BigDecimal>,
    pub quantity: Option<i32>,
    pub description: Option<String>,
    pub player_name: Option<String>,
    pub rarity: Option<String>,
    pub graded: Option<bool>,
    pub grade_company: Option<String>,
    pub grade_value: Option<String>,
}

impl CardDraft {
    /// Stock to add when the row is inserted or merged.
    pub fn quantity_or_default(&self) -> i32 {
        self.quantity.unwrap_or(1)
    }

    pub fn graded_or_default(&self) -> bool {
        self.graded.unwrap_or(false)
    }
}

/// What to do with a row that matches existing inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateAction {
    #[default]
    Skip,
    Update,
    Merge,
}

impl DuplicateAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            DuplicateAction::Skip => "skip",
            DuplicateAction::Update => "update",
            DuplicateAction::Merge => "merge",
        }
    }
}

impl FromStr for DuplicateAction {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(DuplicateAction::Skip),
            "update" => Ok(DuplicateAction::Update),
            "merge" => Ok(DuplicateAction::Merge),
            other => Err(DomainError::UnknownDuplicateAction(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportStatus {
    Processing,
    Completed,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Processing => "processing",
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
        }
    }
}

impl FromStr for ImportStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processing" => Ok(ImportStatus::Processing),
            "completed" => Ok(ImportStatus::Completed),
            "failed" => Ok(ImportStatus::Failed),
            other => Err(DomainError::UnknownImportStatus(other.to_string())),
        }
    }
}
