//! Turns a [`Selection`] into ordered, priced estimate lines.
//!
//! Price resolution for every line is: override by display name, then the
//! catalog price of the referenced id, then the price stored on the selection,
//! then zero. Quantities below one count as one.

pub mod catalog;
pub mod overrides;

use rust_decimal::Decimal;
use tracing::warn;

use crate::domain::catalog_item::CatalogItemId;
use crate::domain::estimate::{EstimateItem, Section};
use crate::domain::money::round_money;
use crate::domain::selection::{EquipmentItem, Material, PartKind, PoolShape, Selection};

pub use self::catalog::CatalogIndex;
pub use self::overrides::PriceOverrideTable;

pub const DEFAULT_POLY_PRICE_PER_CUBIC_METER: Decimal = Decimal::from_parts(15_000, 0, 0, false, 0);
const CUBIC_METERS_PER_SKIMMER: Decimal = Decimal::from_parts(25, 0, 0, false, 0);
const CUBIC_METERS_PER_NOZZLE: Decimal = Decimal::from_parts(7, 0, 0, false, 0);

const UNIT_PIECE: &str = "шт";
const UNIT_SET: &str = "компл";
const UNIT_CUBIC_METER: &str = "м³";

pub trait PricingEngine: Send + Sync {
    fn derive_items(
        &self,
        selection: &Selection,
        catalog: &CatalogIndex,
        overrides: &PriceOverrideTable,
    ) -> Vec<EstimateItem>;

    fn total(&self, items: &[EstimateItem]) -> Decimal {
        total(items)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct DeterministicPricingEngine;

impl PricingEngine for DeterministicPricingEngine {
    fn derive_items(
        &self,
        selection: &Selection,
        catalog: &CatalogIndex,
        overrides: &PriceOverrideTable,
    ) -> Vec<EstimateItem> {
        derive_items(selection, catalog, overrides)
    }
}

/// Sum of line totals. A line that would overflow the sum is left out.
pub fn total(items: &[EstimateItem]) -> Decimal {
    items.iter().fold(Decimal::ZERO, |sum, item| match sum.checked_add(item.total) {
        Some(next) => next,
        None => {
            warn!(
                event_name = "pricing.total_overflow",
                item_id = %item.id,
                "estimate total overflows; line left out of the sum"
            );
            sum
        }
    })
}

pub fn derive_items(
    selection: &Selection,
    catalog: &CatalogIndex,
    overrides: &PriceOverrideTable,
) -> Vec<EstimateItem> {
    let mut lines = LineBuilder { catalog, overrides, items: Vec::new() };
    let shape = selection.active_shape();
    let volume = shape.volume();

    match (shape, selection.material.as_ref()) {
        (PoolShape::Bowl(bowl), _) => lines.push(Line {
            id: "bowl_price".to_string(),
            name: bowl.name.clone(),
            section: Section::Bowl,
            catalog_id: bowl.id.as_ref(),
            stored_price: bowl.price,
            quantity: None,
            unit: UNIT_PIECE.to_string(),
        }),
        (
            PoolShape::Dimensions(_),
            Some(Material::Polypropylene { name, base_price_per_cubic_meter }),
        ) => lines.push(Line {
            id: "bowl_poly_weld".to_string(),
            name: format!("Изготовление чаши из полипропилена ({name})"),
            section: Section::Bowl,
            catalog_id: None,
            stored_price: Some(
                base_price_per_cubic_meter
                    .filter(|price| *price > Decimal::ZERO)
                    .unwrap_or(DEFAULT_POLY_PRICE_PER_CUBIC_METER),
            ),
            quantity: Some(volume),
            unit: UNIT_CUBIC_METER.to_string(),
        }),
        _ => {}
    }

    if let Some(filtration) = &selection.filtration {
        lines.push(equipment_line("filtration_main".to_string(), filtration, Section::Equipment, None));
    }

    if let Some(heating) = &selection.heating {
        if heating.items.is_empty() {
            lines.push(Line {
                id: "heating_main".to_string(),
                name: display_name(heating.name.as_deref(), heating.model.as_deref()),
                section: Section::Heating,
                catalog_id: heating.id.as_ref(),
                stored_price: heating.price,
                quantity: None,
                unit: UNIT_PIECE.to_string(),
            });
        } else {
            for (index, item) in heating.items.iter().enumerate() {
                lines.push(equipment_line(format!("heat_{index}"), item, Section::Heating, None));
            }
        }
    }

    if let Some(parts) = &selection.parts {
        if parts.items.is_empty() {
            lines.push(Line {
                id: "parts_main".to_string(),
                name: parts.name.clone().unwrap_or_default(),
                section: Section::Equipment,
                catalog_id: parts.id.as_ref(),
                stored_price: parts.price,
                quantity: None,
                unit: UNIT_SET.to_string(),
            });
        } else {
            for (index, item) in parts.items.iter().enumerate() {
                let quantity = part_quantity(item, volume);
                lines.push(equipment_line(
                    format!("part_{index}"),
                    item,
                    Section::Equipment,
                    Some(quantity),
                ));
            }
        }
    }

    for (index, item) in selection.additional.iter().enumerate() {
        lines.push(equipment_line(format!("add_{index}"), item, Section::Additional, None));
    }

    for work in &selection.works {
        let quantity = effective_quantity(work.quantity);
        let unit_price = work.total.unwrap_or_default() / quantity;
        lines.push(Line {
            id: format!("work_{}", work.id),
            name: work.name.clone(),
            section: Section::Works,
            catalog_id: None,
            stored_price: Some(unit_price),
            quantity: Some(quantity),
            unit: work.unit.clone().unwrap_or_else(|| UNIT_PIECE.to_string()),
        });
    }

    if let Some(parts) = &selection.parts {
        for (index, item) in parts.items.iter().enumerate() {
            if let Some(price) = installation_price(item.installation_price) {
                lines.push(installation_line(
                    format!("inst_part_{index}"),
                    format!("Монтаж: {}", item.display_name("")),
                    price,
                    Some(part_quantity(item, volume)),
                ));
            }
        }
    }

    if let Some(price) =
        selection.heating.as_ref().and_then(|heating| installation_price(heating.installation_price))
    {
        lines.push(installation_line("inst_heat".to_string(), "Монтаж нагревателя".to_string(), price, None));
    }

    for (index, item) in selection.additional.iter().enumerate() {
        if let Some(price) = installation_price(item.installation_price) {
            lines.push(installation_line(
                format!("inst_add_{index}"),
                format!("Монтаж: {}", item.display_name("")),
                price,
                None,
            ));
        }
    }

    lines.items
}

struct Line<'a> {
    id: String,
    name: String,
    section: Section,
    catalog_id: Option<&'a CatalogItemId>,
    stored_price: Option<Decimal>,
    quantity: Option<Decimal>,
    unit: String,
}

struct LineBuilder<'a> {
    catalog: &'a CatalogIndex,
    overrides: &'a PriceOverrideTable,
    items: Vec<EstimateItem>,
}

impl LineBuilder<'_> {
    fn push(&mut self, line: Line<'_>) {
        let price = self
            .overrides
            .get(&line.name)
            .or_else(|| line.catalog_id.and_then(|id| self.catalog.price_of(id)))
            .or(line.stored_price)
            .unwrap_or_default();
        let quantity = effective_quantity(line.quantity);
        let Some(line_total) = price.checked_mul(quantity) else {
            warn!(
                event_name = "pricing.line_overflow",
                item_id = %line.id,
                %price,
                %quantity,
                "line total overflows; line skipped"
            );
            return;
        };

        self.items.push(EstimateItem {
            id: line.id,
            name: line.name,
            section: line.section,
            quantity,
            unit: line.unit,
            price,
            total: round_money(line_total),
        });
    }
}

fn equipment_line(
    id: String,
    item: &EquipmentItem,
    section: Section,
    quantity: Option<Decimal>,
) -> Line<'_> {
    Line {
        id,
        name: item.display_name(""),
        section,
        catalog_id: item.id.as_ref(),
        stored_price: item.price,
        quantity: quantity.or(item.quantity),
        unit: item.unit.clone().unwrap_or_else(|| UNIT_PIECE.to_string()),
    }
}

fn installation_line(
    id: String,
    name: String,
    price: Decimal,
    quantity: Option<Decimal>,
) -> Line<'static> {
    Line {
        id,
        name,
        section: Section::Installation,
        catalog_id: None,
        stored_price: Some(price),
        quantity,
        unit: UNIT_PIECE.to_string(),
    }
}

fn display_name(name: Option<&str>, model: Option<&str>) -> String {
    name.filter(|name| !name.trim().is_empty()).or(model).unwrap_or_default().to_string()
}

fn installation_price(price: Option<Decimal>) -> Option<Decimal> {
    price.filter(|price| *price > Decimal::ZERO)
}

/// Skimmers and nozzles scale with pool volume once it is known.
fn part_quantity(item: &EquipmentItem, volume: Decimal) -> Decimal {
    if volume > Decimal::ZERO {
        match item.kind {
            Some(PartKind::Skimmer) => return (volume / CUBIC_METERS_PER_SKIMMER).ceil(),
            Some(PartKind::Nozzle) => return (volume / CUBIC_METERS_PER_NOZZLE).ceil(),
            _ => {}
        }
    }
    effective_quantity(item.quantity)
}

pub fn effective_quantity(quantity: Option<Decimal>) -> Decimal {
    match quantity {
        Some(quantity) if quantity >= Decimal::ONE => quantity,
        _ => Decimal::ONE,
    }
}
