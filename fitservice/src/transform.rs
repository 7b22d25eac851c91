//! Pure transforms from stored fittings to read views
//!
//! Nothing here performs I/O: names are resolved by the caller and passed in.

use fitesi::{Fitting, ItemFlag};
use fitrefdata::ShipGroupingMetadata;
use fitstore::FittingSummary;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};

// ============ Grouping ============

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupedFitting {
    pub fitting_id: i64,
    pub name: String,
    /// Present in the most recent sync index
    pub is_synced: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipGroup {
    pub ship_type_id: i64,
    pub ship_type_name: String,
    pub fittings: Vec<GroupedFitting>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FactionGroup {
    pub ship_faction_name: String,
    pub ships: Vec<ShipGroup>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassGroup {
    pub ship_class_name: String,
    pub factions: Vec<FactionGroup>,
}

/// Trimmed, lowercased query
pub fn normalize_query(query: &str) -> String {
    query.trim().to_lowercase()
}

/// Substring match on the fitting name or the hull name
///
/// `query` must already be normalized; an empty query matches everything.
/// Scattered in-order letters do not match: `"crc"` does not find a Caracal.
pub fn matches_query(query: &str, fitting_name: &str, ship_type_name: &str) -> bool {
    query.is_empty()
        || fitting_name.to_lowercase().contains(query)
        || ship_type_name.to_lowercase().contains(query)
}

fn compare_text(a: &str, b: &str) -> Ordering {
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(b))
}

/// Builds the class -> faction -> hull -> fittings tree
///
/// Every level is sorted case-insensitively (ties by exact text, then id).
/// Hulls missing from `metadata` fall under the unknown class and faction.
pub fn group_fittings(
    summaries: &[FittingSummary],
    metadata: &HashMap<i64, ShipGroupingMetadata>,
    synced: &HashSet<i64>,
    query: &str,
) -> Vec<ClassGroup> {
    let query = normalize_query(query);
    let mut tree: BTreeMap<String, BTreeMap<String, HashMap<i64, ShipGroup>>> = BTreeMap::new();

    for summary in summaries {
        let (ship_type_name, class_name, faction_name) = match metadata.get(&summary.ship_type_id) {
            Some(meta) => (
                meta.ship_type_name.clone(),
                meta.ship_class_name.clone(),
                meta.ship_faction_name.clone(),
            ),
            None => (
                summary.ship_type_id.to_string(),
                fitrefdata::UNKNOWN_CLASS.to_string(),
                fitrefdata::UNKNOWN_FACTION.to_string(),
            ),
        };

        if !matches_query(&query, &summary.name, &ship_type_name) {
            continue;
        }

        tree.entry(class_name)
            .or_default()
            .entry(faction_name)
            .or_default()
            .entry(summary.ship_type_id)
            .or_insert_with(|| ShipGroup {
                ship_type_id: summary.ship_type_id,
                ship_type_name,
                fittings: Vec::new(),
            })
            .fittings
            .push(GroupedFitting {
                fitting_id: summary.id,
                name: summary.name.clone(),
                is_synced: synced.contains(&summary.id),
            });
    }

    let mut classes: Vec<ClassGroup> = tree
        .into_iter()
        .map(|(ship_class_name, factions)| {
            let mut factions: Vec<FactionGroup> = factions
                .into_iter()
                .map(|(ship_faction_name, ships)| {
                    let mut ships: Vec<ShipGroup> = ships.into_values().collect();
                    for ship in &mut ships {
                        ship.fittings.sort_by(|a, b| {
                            compare_text(&a.name, &b.name).then_with(|| a.fitting_id.cmp(&b.fitting_id))
                        });
                    }
                    ships.sort_by(|a, b| {
                        compare_text(&a.ship_type_name, &b.ship_type_name)
                            .then_with(|| a.ship_type_id.cmp(&b.ship_type_id))
                    });
                    FactionGroup {
                        ship_faction_name,
                        ships,
                    }
                })
                .collect();
            factions.sort_by(|a, b| compare_text(&a.ship_faction_name, &b.ship_faction_name));
            ClassGroup {
                ship_class_name,
                factions,
            }
        })
        .collect();
    classes.sort_by(|a, b| compare_text(&a.ship_class_name, &b.ship_class_name));
    classes
}

// ============ EFT export ============

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bucket {
    Low,
    Medium,
    High,
    Rig,
    Drones,
    Cargo,
}

/// Bucket and ordinal of a named flag; unknown and numeric flags have none
fn classify(flag: &ItemFlag) -> Option<(Bucket, u64)> {
    let name = flag.as_named()?;
    for (prefix, bucket) in [
        ("LoSlot", Bucket::Low),
        ("MedSlot", Bucket::Medium),
        ("HiSlot", Bucket::High),
        ("RigSlot", Bucket::Rig),
    ] {
        if let Some(suffix) = name.strip_prefix(prefix) {
            // A bare prefix counts as slot 0; other non-numeric suffixes
            // sort after every numbered slot.
            let ordinal = if suffix.is_empty() {
                0
            } else {
                suffix.parse().unwrap_or(u64::MAX)
            };
            return Some((bucket, ordinal));
        }
    }
    match name {
        "DroneBay" => Some((Bucket::Drones, 0)),
        "Cargo" => Some((Bucket::Cargo, 0)),
        _ => None,
    }
}

/// `"<name> x<N>"` when more than one
pub fn format_quantity(name: &str, quantity: u32) -> String {
    if quantity > 1 {
        format!("{} x{}", name, quantity)
    } else {
        name.to_string()
    }
}

fn type_name(names: &HashMap<i64, String>, type_id: i64) -> String {
    names
        .get(&type_id)
        .cloned()
        .unwrap_or_else(|| type_id.to_string())
}

/// Renders a fitting in EFT format
///
/// Slot blocks are ordered by slot number (stable for equal numbers); drones
/// and cargo keep their stored order. Items whose flag is not a known slot or
/// bay are left out.
pub fn render_eft(fitting: &Fitting, ship_type_name: &str, names: &HashMap<i64, String>) -> String {
    let mut blocks: [Vec<(u64, String)>; 6] = Default::default();

    for item in &fitting.items {
        let Some((bucket, ordinal)) = classify(&item.flag) else {
            continue;
        };
        let text = format_quantity(&type_name(names, item.type_id), item.quantity);
        blocks[bucket as usize].push((ordinal, text));
    }

    for block in &mut blocks[..Bucket::Drones as usize] {
        block.sort_by_key(|(ordinal, _)| *ordinal);
    }

    let mut lines = vec![format!("[{}, {}]", ship_type_name, fitting.name)];
    for (i, block) in blocks.into_iter().enumerate() {
        if i > 0 {
            lines.push(String::new());
        }
        lines.extend(block.into_iter().map(|(_, text)| text));
    }

    let mut eft = lines.join("\n");
    eft.push('\n');
    eft
}

// ============ Detail slot model ============

/// Display names grouped by raw flag, unknown flags included
pub fn item_names_by_flag(
    fitting: &Fitting,
    names: &HashMap<i64, String>,
) -> BTreeMap<String, Vec<String>> {
    let mut by_flag: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for item in &fitting.items {
        by_flag
            .entry(item.flag.to_string())
            .or_default()
            .push(format_quantity(&type_name(names, item.type_id), item.quantity));
    }
    by_flag
}
