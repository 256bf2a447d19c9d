use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::domain::catalog_item::CatalogItemId;
use crate::domain::money;

/// Pool body material. The `id` tag matches the stored browser format.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "id", rename_all = "snake_case")]
pub enum Material {
    Composite {
        #[serde(default)]
        name: String,
    },
    Polypropylene {
        #[serde(default)]
        name: String,
        #[serde(default, rename = "basePricePerCubicMeter", with = "money::lenient")]
        base_price_per_cubic_meter: Option<Decimal>,
    },
    Concrete {
        #[serde(default)]
        name: String,
    },
}

impl Material {
    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Composite { .. })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Composite { name } | Self::Polypropylene { name, .. } | Self::Concrete { name } => {
                name
            }
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    #[serde(default, with = "money::lenient")]
    pub length: Option<Decimal>,
    #[serde(default, with = "money::lenient")]
    pub width: Option<Decimal>,
    #[serde(default, with = "money::lenient")]
    pub depth: Option<Decimal>,
    #[serde(default, with = "money::lenient")]
    pub volume: Option<Decimal>,
}

impl Dimensions {
    pub fn new(length: Decimal, width: Decimal, depth: Decimal) -> Self {
        Self { length: Some(length), width: Some(width), depth: Some(depth), volume: None }
    }

    /// Explicit volume when present, otherwise length × width × depth.
    pub fn volume(&self) -> Decimal {
        derived_volume(self.volume, self.length, self.width, self.depth)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bowl {
    #[serde(default)]
    pub id: Option<CatalogItemId>,
    #[serde(default)]
    pub name: String,
    #[serde(default, with = "money::lenient")]
    pub price: Option<Decimal>,
    #[serde(default, with = "money::lenient")]
    pub length: Option<Decimal>,
    #[serde(default, with = "money::lenient")]
    pub width: Option<Decimal>,
    #[serde(default, with = "money::lenient")]
    pub depth: Option<Decimal>,
    #[serde(default, with = "money::lenient")]
    pub volume: Option<Decimal>,
}

impl Bowl {
    pub fn volume(&self) -> Decimal {
        derived_volume(self.volume, self.length, self.width, self.depth)
    }
}

fn derived_volume(
    explicit: Option<Decimal>,
    length: Option<Decimal>,
    width: Option<Decimal>,
    depth: Option<Decimal>,
) -> Decimal {
    if let Some(volume) = explicit.filter(|volume| *volume > Decimal::ZERO) {
        return volume;
    }
    match (length, width, depth) {
        (Some(length), Some(width), Some(depth)) => {
            match length.checked_mul(width).and_then(|area| area.checked_mul(depth)) {
                Some(volume) => volume,
                None => {
                    warn!(
                        event_name = "selection.volume_overflow",
                        %length,
                        %width,
                        %depth,
                        "pool dimensions overflow; treating volume as unknown"
                    );
                    Decimal::ZERO
                }
            }
        }
        _ => Decimal::ZERO,
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartKind {
    Skimmer,
    Nozzle,
    Drain,
    Light,
    #[serde(other)]
    Other,
}

/// One piece of equipment as the wizard stores it: a catalog reference plus
/// denormalized display fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentItem {
    #[serde(default)]
    pub id: Option<CatalogItemId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<PartKind>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default, with = "money::lenient")]
    pub quantity: Option<Decimal>,
    #[serde(default, alias = "unitPrice", with = "money::lenient")]
    pub price: Option<Decimal>,
    #[serde(default, with = "money::lenient")]
    pub installation_price: Option<Decimal>,
    #[serde(default)]
    pub unit: Option<String>,
}

impl EquipmentItem {
    pub fn priced(id: &str, name: &str, price: Decimal) -> Self {
        Self {
            id: Some(CatalogItemId(id.to_string())),
            name: Some(name.to_string()),
            price: Some(price),
            ..Self::default()
        }
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = Some(quantity);
        self
    }

    pub fn with_kind(mut self, kind: PartKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_installation_price(mut self, price: Decimal) -> Self {
        self.installation_price = Some(price);
        self
    }

    /// Display name, falling back to the model and then to `fallback`.
    pub fn display_name(&self, fallback: &str) -> String {
        self.name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .or(self.model.as_deref().filter(|model| !model.trim().is_empty()))
            .unwrap_or(fallback)
            .to_string()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatingSelection {
    #[serde(default)]
    pub id: Option<CatalogItemId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, alias = "unitPrice", with = "money::lenient")]
    pub price: Option<Decimal>,
    #[serde(default, with = "money::lenient")]
    pub installation_price: Option<Decimal>,
    #[serde(default)]
    pub items: Vec<EquipmentItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartsSelection {
    #[serde(default)]
    pub id: Option<CatalogItemId>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, with = "money::lenient")]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub items: Vec<EquipmentItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkSelection {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, with = "money::lenient")]
    pub quantity: Option<Decimal>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, with = "money::lenient")]
    pub total: Option<Decimal>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub email: String,
}

/// The in-progress, not-yet-saved pool configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Selection {
    #[serde(default)]
    pub material: Option<Material>,
    #[serde(default)]
    pub dimensions: Option<Dimensions>,
    #[serde(default)]
    pub bowl: Option<Bowl>,
    #[serde(default)]
    pub filtration: Option<EquipmentItem>,
    #[serde(default)]
    pub heating: Option<HeatingSelection>,
    #[serde(default)]
    pub parts: Option<PartsSelection>,
    #[serde(default)]
    pub additional: Vec<EquipmentItem>,
    #[serde(default)]
    pub works: Vec<WorkSelection>,
    #[serde(default)]
    pub client_info: ClientInfo,
}

/// Which description of the pool body pricing should use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolShape<'a> {
    Bowl(&'a Bowl),
    Dimensions(&'a Dimensions),
    Unset,
}

impl PoolShape<'_> {
    pub fn volume(&self) -> Decimal {
        match self {
            Self::Bowl(bowl) => bowl.volume(),
            Self::Dimensions(dimensions) => dimensions.volume(),
            Self::Unset => Decimal::ZERO,
        }
    }
}

/// A single-field change to a [`Selection`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SelectionPatch {
    Material(Option<Material>),
    Dimensions(Option<Dimensions>),
    Bowl(Option<Bowl>),
    Filtration(Option<EquipmentItem>),
    Heating(Option<HeatingSelection>),
    Parts(Option<PartsSelection>),
    Additional(Vec<EquipmentItem>),
    Works(Vec<WorkSelection>),
    ClientInfo(ClientInfo),
}

impl SelectionPatch {
    pub fn field_name(&self) -> &'static str {
        match self {
            Self::Material(_) => "material",
            Self::Dimensions(_) => "dimensions",
            Self::Bowl(_) => "bowl",
            Self::Filtration(_) => "filtration",
            Self::Heating(_) => "heating",
            Self::Parts(_) => "parts",
            Self::Additional(_) => "additional",
            Self::Works(_) => "works",
            Self::ClientInfo(_) => "clientInfo",
        }
    }

    /// Builds a patch from a field name and a JSON value, the shape form
    /// controls and the CLI hand over.
    pub fn from_json(field: &str, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match field {
            "material" => Self::Material(serde_json::from_value(value)?),
            "dimensions" => Self::Dimensions(serde_json::from_value(value)?),
            "bowl" => Self::Bowl(serde_json::from_value(value)?),
            "filtration" => Self::Filtration(serde_json::from_value(value)?),
            "heating" => Self::Heating(serde_json::from_value(value)?),
            "parts" => Self::Parts(serde_json::from_value(value)?),
            "additional" => Self::Additional(serde_json::from_value(value)?),
            "works" => Self::Works(serde_json::from_value(value)?),
            "clientInfo" | "client_info" => Self::ClientInfo(serde_json::from_value(value)?),
            other => {
                return Err(serde::de::Error::custom(format!("unknown selection field `{other}`")))
            }
        })
    }
}

impl Selection {
    pub fn apply(&mut self, patch: SelectionPatch) {
        match patch {
            SelectionPatch::Material(value) => self.material = value,
            SelectionPatch::Dimensions(value) => self.dimensions = value,
            SelectionPatch::Bowl(value) => self.bowl = value,
            SelectionPatch::Filtration(value) => self.filtration = value,
            SelectionPatch::Heating(value) => self.heating = value,
            SelectionPatch::Parts(value) => self.parts = value,
            SelectionPatch::Additional(value) => self.additional = value,
            SelectionPatch::Works(value) => self.works = value,
            SelectionPatch::ClientInfo(value) => self.client_info = value,
        }
    }

    /// Composite pools are described by the chosen bowl, every other
    /// material by free dimensions. With no material yet, a bowl wins.
    pub fn active_shape(&self) -> PoolShape<'_> {
        let composite_or_unset = self.material.as_ref().map_or(true, Material::is_composite);
        if composite_or_unset {
            if let Some(bowl) = &self.bowl {
                return PoolShape::Bowl(bowl);
            }
        }
        match &self.dimensions {
            Some(dimensions) if !self.material.as_ref().is_some_and(Material::is_composite) => {
                PoolShape::Dimensions(dimensions)
            }
            _ => PoolShape::Unset,
        }
    }

    /// Parses a stored selection field by field. A malformed field is logged
    /// and left at its default instead of discarding the whole value.
    pub fn from_value_lenient(value: &Value) -> Self {
        let Some(object) = value.as_object() else {
            warn!(event_name = "selection.decode.not_an_object", "stored selection is not an object");
            return Self::default();
        };

        Self {
            material: lenient_field(object.get("material"), "material"),
            dimensions: lenient_field(object.get("dimensions"), "dimensions"),
            bowl: lenient_field(object.get("bowl"), "bowl"),
            filtration: lenient_field(object.get("filtration"), "filtration"),
            heating: lenient_field(object.get("heating"), "heating"),
            parts: lenient_field(object.get("parts"), "parts"),
            additional: lenient_list(object.get("additional"), "additional"),
            works: lenient_list(object.get("works"), "works"),
            client_info: lenient_field(object.get("clientInfo"), "clientInfo").unwrap_or_default(),
        }
    }
}

fn lenient_field<T: DeserializeOwned>(value: Option<&Value>, field: &'static str) -> Option<T> {
    let value = value.filter(|value| !value.is_null())?;
    match serde_json::from_value(value.clone()) {
        Ok(parsed) => Some(parsed),
        Err(error) => {
            warn!(
                event_name = "selection.decode.field_skipped",
                field,
                error = %error,
                "skipping malformed selection field"
            );
            None
        }
    }
}

/// Works were historically stored either as an array or as an id-keyed map.
fn lenient_list<T: DeserializeOwned>(value: Option<&Value>, field: &'static str) -> Vec<T> {
    let elements: Vec<&Value> = match value {
        Some(Value::Array(elements)) => elements.iter().collect(),
        Some(Value::Object(map)) => map.values().collect(),
        _ => return Vec::new(),
    };
    elements.into_iter().filter_map(|element| lenient_field(Some(element), field)).collect()
}
