//! Prerequisite expressions and the upgrade dependency graph.
//!
//! An expression is a `;`-separated list of tokens. Each token is classified
//! by its shape: a farm stage name, a `_tool`/`_weapon` token, a
//! `_built`/`_complete` token, or (failing all of those) an upgrade id.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::catalog::{GameConfiguration, UpgradeDef};
use crate::farm::FarmStage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrerequisiteKind {
    Upgrade,
    FarmStage,
    Tool,
    Building,
}

impl PrerequisiteKind {
    /// Classify a single token.
    #[must_use]
    pub fn classify(token: &str) -> Self {
        if FarmStage::from_token(token).is_some() {
            Self::FarmStage
        } else if token.contains("_tool") || token.contains("_weapon") {
            Self::Tool
        } else if token.contains("_built") || token.contains("_complete") {
            Self::Building
        } else {
            Self::Upgrade
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Upgrade => "upgrade",
            Self::FarmStage => "farm_stage",
            Self::Tool => "tool",
            Self::Building => "building",
        }
    }
}

impl fmt::Display for PrerequisiteKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a player currently holds, as far as prerequisites are concerned.
pub trait Holdings {
    fn owns_upgrade(&self, id: &str) -> bool;
    fn farm_stage(&self) -> FarmStage;
    /// Tool, weapon, or building token granted by an upgrade.
    fn has_unlock(&self, token: &str) -> bool;
}

/// Plain-data holdings, handy for what-if queries and reports.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldingsSnapshot {
    pub upgrades: BTreeSet<String>,
    pub farm_stage: FarmStage,
    pub unlocks: BTreeSet<String>,
}

impl Holdings for HoldingsSnapshot {
    fn owns_upgrade(&self, id: &str) -> bool {
        self.upgrades.contains(id)
    }

    fn farm_stage(&self) -> FarmStage {
        self.farm_stage
    }

    fn has_unlock(&self, token: &str) -> bool {
        self.unlocks.contains(token)
    }
}

/// Holdings with extra upgrades assumed owned.
struct AssumeOwned<'a, H: ?Sized> {
    base: &'a H,
    extra: &'a [String],
}

impl<H: Holdings + ?Sized> Holdings for AssumeOwned<'_, H> {
    fn owns_upgrade(&self, id: &str) -> bool {
        self.base.owns_upgrade(id) || self.extra.iter().any(|extra| extra == id)
    }

    fn farm_stage(&self) -> FarmStage {
        self.base.farm_stage()
    }

    fn has_unlock(&self, token: &str) -> bool {
        self.base.has_unlock(token)
    }
}

/// Parsed prerequisite expression, grouped by kind in source order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrerequisiteSet {
    pub upgrades: Vec<String>,
    pub farm_stages: Vec<FarmStage>,
    pub tools: Vec<String>,
    pub buildings: Vec<String>,
}

impl PrerequisiteSet {
    #[must_use]
    pub fn parse(expression: &str) -> Self {
        let mut set = Self::default();
        for token in expression.split(';').map(str::trim).filter(|t| !t.is_empty()) {
            match PrerequisiteKind::classify(token) {
                PrerequisiteKind::FarmStage => {
                    if let Some(stage) = FarmStage::from_token(token) {
                        set.farm_stages.push(stage);
                    }
                }
                PrerequisiteKind::Tool => set.tools.push(token.to_string()),
                PrerequisiteKind::Building => set.buildings.push(token.to_string()),
                PrerequisiteKind::Upgrade => set.upgrades.push(token.to_string()),
            }
        }
        set
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.upgrades.is_empty()
            && self.farm_stages.is_empty()
            && self.tools.is_empty()
            && self.buildings.is_empty()
    }

    /// Evaluate against `holdings`. The first missing requirement wins,
    /// checking upgrades, then farm stages, then tools, then buildings.
    #[must_use]
    pub fn check<H: Holdings + ?Sized>(&self, holdings: &H) -> PrerequisiteStatus {
        let mut status = PrerequisiteStatus {
            can_purchase: true,
            ..PrerequisiteStatus::default()
        };
        for id in &self.upgrades {
            if !holdings.owns_upgrade(id) {
                status.block(PrerequisiteKind::Upgrade, id);
                status.missing_upgrades.push(id.clone());
            }
        }
        for stage in &self.farm_stages {
            if holdings.farm_stage() < *stage {
                status.block(PrerequisiteKind::FarmStage, stage.as_str());
                status.missing_farm_stages.push(*stage);
            }
        }
        for tool in &self.tools {
            if !holdings.has_unlock(tool) {
                status.block(PrerequisiteKind::Tool, tool);
                status.missing_tools.push(tool.clone());
            }
        }
        for building in &self.buildings {
            if !holdings.has_unlock(building) {
                status.block(PrerequisiteKind::Building, building);
                status.missing_buildings.push(building.clone());
            }
        }
        status
    }
}

/// Outcome of a prerequisite check, naming what blocks a purchase.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrerequisiteStatus {
    pub can_purchase: bool,
    pub missing_upgrades: Vec<String>,
    pub missing_farm_stages: Vec<FarmStage>,
    pub missing_tools: Vec<String>,
    pub missing_buildings: Vec<String>,
    pub next_requirement: Option<String>,
    pub blocking: Option<PrerequisiteKind>,
}

impl PrerequisiteStatus {
    fn block(&mut self, kind: PrerequisiteKind, requirement: &str) {
        self.can_purchase = false;
        if self.next_requirement.is_none() {
            self.next_requirement = Some(requirement.to_string());
            self.blocking = Some(kind);
        }
    }
}

/// Convenience wrapper: parse and check in one go.
#[must_use]
pub fn check_prerequisites<H: Holdings + ?Sized>(
    upgrade: &UpgradeDef,
    holdings: &H,
) -> PrerequisiteStatus {
    PrerequisiteSet::parse(&upgrade.prerequisite).check(holdings)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeStatus {
    Owned,
    Available,
    PrerequisiteMissing,
    FarmLocked,
    ToolLocked,
    BuildingLocked,
}

#[must_use]
pub fn upgrade_status<H: Holdings + ?Sized>(upgrade: &UpgradeDef, holdings: &H) -> UpgradeStatus {
    if holdings.owns_upgrade(&upgrade.id) {
        return UpgradeStatus::Owned;
    }
    let status = check_prerequisites(upgrade, holdings);
    match status.blocking {
        None => UpgradeStatus::Available,
        Some(PrerequisiteKind::FarmStage) => UpgradeStatus::FarmLocked,
        Some(PrerequisiteKind::Tool) => UpgradeStatus::ToolLocked,
        Some(PrerequisiteKind::Building) => UpgradeStatus::BuildingLocked,
        Some(PrerequisiteKind::Upgrade) => UpgradeStatus::PrerequisiteMissing,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphNode {
    pub id: String,
    pub prerequisites: PrerequisiteSet,
    pub dependents: Vec<String>,
    /// Longest chain of upgrade prerequisites beneath this node.
    pub depth: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub kind: PrerequisiteKind,
}

/// Summed cost of a purchase path.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PathCost {
    pub gold: u64,
    pub energy: f64,
    pub materials: BTreeMap<String, u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    InProgress,
    Done(u32),
}

/// Upgrade id → prerequisite graph over a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyGraph {
    nodes: BTreeMap<String, GraphNode>,
    edges: Vec<GraphEdge>,
}

impl DependencyGraph {
    #[must_use]
    pub fn build(upgrades: &[UpgradeDef]) -> Self {
        let mut nodes: BTreeMap<String, GraphNode> = upgrades
            .iter()
            .map(|upgrade| {
                (
                    upgrade.id.clone(),
                    GraphNode {
                        id: upgrade.id.clone(),
                        prerequisites: PrerequisiteSet::parse(&upgrade.prerequisite),
                        dependents: Vec::new(),
                        depth: 0,
                    },
                )
            })
            .collect();

        let mut edges = Vec::new();
        let mut dependents: Vec<(String, String)> = Vec::new();
        for upgrade in upgrades {
            let Some(node) = nodes.get(&upgrade.id) else {
                continue;
            };
            let set = &node.prerequisites;
            for prereq in &set.upgrades {
                if nodes.contains_key(prereq) {
                    edges.push(edge(prereq, &upgrade.id, PrerequisiteKind::Upgrade));
                    dependents.push((prereq.clone(), upgrade.id.clone()));
                }
            }
            for stage in &set.farm_stages {
                edges.push(edge(stage.as_str(), &upgrade.id, PrerequisiteKind::FarmStage));
            }
            for tool in &set.tools {
                edges.push(edge(tool, &upgrade.id, PrerequisiteKind::Tool));
            }
            for building in &set.buildings {
                edges.push(edge(building, &upgrade.id, PrerequisiteKind::Building));
            }
        }
        for (prereq, dependent) in dependents {
            if let Some(node) = nodes.get_mut(&prereq) {
                node.dependents.push(dependent);
            }
        }

        let mut graph = Self { nodes, edges };
        graph.compute_depths();
        graph
    }

    #[must_use]
    pub fn from_catalog(catalog: &GameConfiguration) -> Self {
        Self::build(&catalog.upgrades)
    }

    fn compute_depths(&mut self) {
        let mut visits: BTreeMap<String, Visit> = BTreeMap::new();
        let ids: Vec<String> = self.nodes.keys().cloned().collect();
        for id in &ids {
            self.depth_of(id, &mut visits);
        }
        for (id, visit) in visits {
            if let (Some(node), Visit::Done(depth)) = (self.nodes.get_mut(&id), visit) {
                node.depth = depth;
            }
        }
    }

    fn depth_of(&self, id: &str, visits: &mut BTreeMap<String, Visit>) -> u32 {
        match visits.get(id) {
            Some(Visit::Done(depth)) => return *depth,
            Some(Visit::InProgress) => {
                log::warn!("cyclic prerequisite involving upgrade `{id}`; treating it as depth 0");
                visits.insert(id.to_string(), Visit::Done(0));
                return 0;
            }
            None => {}
        }
        let Some(node) = self.nodes.get(id) else {
            return 0;
        };
        visits.insert(id.to_string(), Visit::InProgress);
        let mut depth = 0;
        for prereq in &node.prerequisites.upgrades {
            if self.nodes.contains_key(prereq) {
                depth = depth.max(self.depth_of(prereq, visits).saturating_add(1));
            }
        }
        // A node that closed a cycle was pinned to 0 while we recursed.
        if let Some(Visit::Done(0)) = visits.get(id) {
            return 0;
        }
        visits.insert(id.to_string(), Visit::Done(depth));
        depth
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &GraphNode> {
        self.nodes.values()
    }

    #[must_use]
    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Upgrades that list `id` as an upgrade prerequisite.
    #[must_use]
    pub fn dependents(&self, id: &str) -> &[String] {
        self.nodes
            .get(id)
            .map_or(&[][..], |node| node.dependents.as_slice())
    }

    #[must_use]
    pub fn depth(&self, id: &str) -> Option<u32> {
        self.nodes.get(id).map(|node| node.depth)
    }

    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.nodes.values().map(|node| node.depth).max().unwrap_or(0)
    }

    /// Unowned upgrades that must be bought, in order, to reach `target`
    /// (inclusive). Only upgrade prerequisites are unwound.
    #[must_use]
    pub fn critical_path<H: Holdings + ?Sized>(&self, target: &str, holdings: &H) -> Vec<String> {
        let mut path = Vec::new();
        let mut visited = BTreeSet::new();
        self.unwind(target, holdings, &mut visited, &mut path);
        path
    }

    fn unwind<H: Holdings + ?Sized>(
        &self,
        id: &str,
        holdings: &H,
        visited: &mut BTreeSet<String>,
        path: &mut Vec<String>,
    ) {
        if holdings.owns_upgrade(id) || !visited.insert(id.to_string()) {
            return;
        }
        let Some(node) = self.nodes.get(id) else {
            return;
        };
        for prereq in &node.prerequisites.upgrades {
            self.unwind(prereq, holdings, visited, path);
        }
        path.push(id.to_string());
    }

    /// Upgrades whose prerequisites are unmet now but would be met if
    /// `ids` were also owned.
    #[must_use]
    pub fn newly_unlocked<H: Holdings + ?Sized>(&self, ids: &[String], holdings: &H) -> Vec<String> {
        let assumed = AssumeOwned {
            base: holdings,
            extra: ids,
        };
        self.nodes
            .values()
            .filter(|node| {
                !node.prerequisites.check(holdings).can_purchase
                    && node.prerequisites.check(&assumed).can_purchase
            })
            .map(|node| node.id.clone())
            .collect()
    }

    /// Total cost of buying every upgrade on `path`. Unknown ids are skipped.
    #[must_use]
    pub fn path_cost(path: &[String], catalog: &GameConfiguration) -> PathCost {
        let mut total = PathCost::default();
        for upgrade in path.iter().filter_map(|id| catalog.upgrade(id)) {
            total.gold = total.gold.saturating_add(upgrade.cost.gold);
            total.energy += upgrade.cost.energy;
            for (material, amount) in &upgrade.cost.materials {
                let entry = total.materials.entry(material.clone()).or_insert(0);
                *entry = entry.saturating_add(*amount);
            }
        }
        total
    }
}

fn edge(from: &str, to: &str, kind: PrerequisiteKind) -> GraphEdge {
    GraphEdge {
        from: from.to_string(),
        to: to.to_string(),
        kind,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{UpgradeCategory, UpgradeCost};

    fn upgrade(id: &str, prerequisite: &str, gold: u64) -> UpgradeDef {
        UpgradeDef {
            id: id.to_string(),
            name: id.to_string(),
            category: UpgradeCategory::Other,
            unlock_day: 1,
            cost: UpgradeCost {
                gold,
                ..UpgradeCost::default()
            },
            effect: "none".to_string(),
            prerequisite: prerequisite.to_string(),
        }
    }

    #[test]
    fn tokens_classify_by_shape() {
        let set = PrerequisiteSet::parse(" pump_2 ; homestead;copper_tool;silver_weapon;forge_built;quest_complete;");
        assert_eq!(set.upgrades, vec!["pump_2"]);
        assert_eq!(set.farm_stages, vec![FarmStage::Homestead]);
        assert_eq!(set.tools, vec!["copper_tool", "silver_weapon"]);
        assert_eq!(set.buildings, vec!["forge_built", "quest_complete"]);
        assert!(PrerequisiteSet::parse("").is_empty());
    }

    #[test]
    fn first_missing_requirement_blocks() {
        let set = PrerequisiteSet::parse("storage_2;homestead;iron_tool");
        let mut holdings = HoldingsSnapshot::default();
        let status = set.check(&holdings);
        assert!(!status.can_purchase);
        assert_eq!(status.blocking, Some(PrerequisiteKind::Upgrade));
        assert_eq!(status.next_requirement.as_deref(), Some("storage_2"));

        holdings.upgrades.insert("storage_2".to_string());
        let status = set.check(&holdings);
        assert_eq!(status.blocking, Some(PrerequisiteKind::FarmStage));
        assert_eq!(status.missing_tools, vec!["iron_tool"]);

        holdings.farm_stage = FarmStage::GreatEstate;
        holdings.unlocks.insert("iron_tool".to_string());
        assert!(set.check(&holdings).can_purchase);
    }

    #[test]
    fn status_reports_lock_kind() {
        let holdings = HoldingsSnapshot {
            upgrades: ["a".to_string()].into_iter().collect(),
            ..HoldingsSnapshot::default()
        };
        assert_eq!(upgrade_status(&upgrade("a", "", 0), &holdings), UpgradeStatus::Owned);
        assert_eq!(upgrade_status(&upgrade("b", "a", 0), &holdings), UpgradeStatus::Available);
        assert_eq!(
            upgrade_status(&upgrade("c", "manor_grounds", 0), &holdings),
            UpgradeStatus::FarmLocked
        );
        assert_eq!(
            upgrade_status(&upgrade("d", "gold_tool", 0), &holdings),
            UpgradeStatus::ToolLocked
        );
        assert_eq!(
            upgrade_status(&upgrade("e", "mill_built", 0), &holdings),
            UpgradeStatus::BuildingLocked
        );
        assert_eq!(
            upgrade_status(&upgrade("f", "zzz", 0), &holdings),
            UpgradeStatus::PrerequisiteMissing
        );
    }

    #[test]
    fn depth_and_dependents() {
        let graph = DependencyGraph::build(&[
            upgrade("a", "", 10),
            upgrade("b", "a", 20),
            upgrade("c", "b;a;homestead", 30),
            upgrade("d", "ghost", 40),
        ]);
        assert_eq!(graph.depth("a"), Some(0));
        assert_eq!(graph.depth("b"), Some(1));
        assert_eq!(graph.depth("c"), Some(2));
        assert_eq!(graph.depth("d"), Some(0));
        assert_eq!(graph.dependents("a"), ["b".to_string(), "c".to_string()]);
        assert_eq!(graph.max_depth(), 2);
        assert!(
            graph
                .edges()
                .iter()
                .any(|e| e.kind == PrerequisiteKind::FarmStage && e.to == "c")
        );
    }

    #[test]
    fn cycles_do_not_hang_and_pin_depth_to_zero() {
        let graph = DependencyGraph::build(&[
            upgrade("self", "self", 0),
            upgrade("x", "y", 0),
            upgrade("y", "x", 0),
        ]);
        assert_eq!(graph.depth("self"), Some(0));
        let x = graph.depth("x").unwrap();
        let y = graph.depth("y").unwrap();
        assert!(x == 0 || y == 0);
        assert!(x <= 1 && y <= 1);
    }

    #[test]
    fn critical_path_unwinds_unowned_prerequisites() {
        let graph = DependencyGraph::build(&[
            upgrade("a", "", 10),
            upgrade("b", "a", 20),
            upgrade("c", "b;a", 30),
        ]);
        let none = HoldingsSnapshot::default();
        assert_eq!(graph.critical_path("c", &none), vec!["a", "b", "c"]);
        let owns_a = HoldingsSnapshot {
            upgrades: ["a".to_string()].into_iter().collect(),
            ..HoldingsSnapshot::default()
        };
        assert_eq!(graph.critical_path("c", &owns_a), vec!["b", "c"]);
    }

    #[test]
    fn owning_an_upgrade_unlocks_its_dependents() {
        let graph = DependencyGraph::build(&[
            upgrade("a", "", 10),
            upgrade("b", "a", 20),
            upgrade("c", "b", 30),
            upgrade("d", "a;homestead", 40),
        ]);
        let holdings = HoldingsSnapshot::default();
        assert_eq!(graph.newly_unlocked(&["a".to_string()], &holdings), vec!["b"]);
    }

    #[test]
    fn path_cost_sums_catalog_costs() {
        let catalog = GameConfiguration::builtin().unwrap();
        let path = vec!["storage_1".to_string(), "storage_2".to_string()];
        let cost = DependencyGraph::path_cost(&path, &catalog);
        assert_eq!(cost.gold, 300);
        assert_eq!(cost.materials.get("stone"), Some(&20));
        assert_eq!(cost.materials.get("copper"), Some(&5));
        assert!((cost.energy - 30.0).abs() < f64::EPSILON);
    }
}
