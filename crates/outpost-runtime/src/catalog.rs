//! Static gameplay tables: hotbar slots, resources, recipes, combat effects,
//! entity health and the deterministic grant rolls.

use outpost_protocol::{BlockPosition, CombatActionKind, ResourceCounts};

// ---------------------------------------------------------------------------
// Hotbar / resources
// ---------------------------------------------------------------------------

pub const SLOT_RUST_BLADE: &str = "slot-1-rust-blade";
pub const SLOT_EMBER_BOLT: &str = "slot-2-ember-bolt";
pub const SLOT_FROST_BIND: &str = "slot-3-frost-bind";
pub const SLOT_BANDAGE: &str = "slot-4-bandage";
pub const SLOT_BOMB: &str = "slot-5-bomb";

pub const DEFAULT_HOTBAR_SLOT_IDS: [&str; 5] = [
    SLOT_RUST_BLADE,
    SLOT_EMBER_BOLT,
    SLOT_FROST_BIND,
    SLOT_BANDAGE,
    SLOT_BOMB,
];

/// Starting stack for a slot.
pub fn default_stack_count(slot_id: &str) -> u32 {
    match slot_id {
        SLOT_BANDAGE => 3,
        SLOT_BOMB => 2,
        _ => 0,
    }
}

pub const RESOURCE_IDS: [&str; 7] = [
    "salvage",
    "wood",
    "stone",
    "fiber",
    "coal",
    "iron_ore",
    "iron_ingot",
];

/// Every catalog resource at zero.
pub fn empty_resources() -> ResourceCounts {
    RESOURCE_IDS.iter().map(|id| (id.to_string(), 0)).collect()
}

/// Fill in missing catalog resources with zero, keeping any extra ids.
pub fn normalize_resources(resources: &mut ResourceCounts) {
    for id in RESOURCE_IDS {
        resources.entry(id.to_string()).or_insert(0);
    }
}

// ---------------------------------------------------------------------------
// Recipes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ingredient {
    pub resource_id: &'static str,
    pub amount: u32,
}

/// Where a recipe's product goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CraftOutput {
    HotbarSlot { slot_id: &'static str, amount: u32 },
    Resource { resource_id: &'static str, amount: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CraftRecipe {
    pub id: &'static str,
    pub ingredients: &'static [Ingredient],
    pub output: CraftOutput,
}

pub const CRAFT_RECIPES: [CraftRecipe; 4] = [
    CraftRecipe {
        id: "craft-bandage",
        ingredients: &[
            Ingredient { resource_id: "fiber", amount: 2 },
            Ingredient { resource_id: "salvage", amount: 1 },
        ],
        output: CraftOutput::HotbarSlot { slot_id: SLOT_BANDAGE, amount: 1 },
    },
    CraftRecipe {
        id: "craft-bomb",
        ingredients: &[
            Ingredient { resource_id: "coal", amount: 2 },
            Ingredient { resource_id: "fiber", amount: 1 },
        ],
        output: CraftOutput::HotbarSlot { slot_id: SLOT_BOMB, amount: 1 },
    },
    CraftRecipe {
        id: "craft-charcoal",
        ingredients: &[Ingredient { resource_id: "wood", amount: 2 }],
        output: CraftOutput::Resource { resource_id: "coal", amount: 1 },
    },
    CraftRecipe {
        id: "craft-iron-ingot",
        ingredients: &[
            Ingredient { resource_id: "iron_ore", amount: 2 },
            Ingredient { resource_id: "coal", amount: 1 },
        ],
        output: CraftOutput::Resource { resource_id: "iron_ingot", amount: 1 },
    },
];

pub fn find_recipe(recipe_id: &str) -> Option<&'static CraftRecipe> {
    CRAFT_RECIPES.iter().find(|recipe| recipe.id == recipe_id)
}

// ---------------------------------------------------------------------------
// Combat
// ---------------------------------------------------------------------------

/// Rules and effect of using a hotbar slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CombatEffect {
    pub kind: CombatActionKind,
    pub cooldown_ticks: u64,
    /// Zero means unlimited.
    pub max_range: f64,
    pub requires_target: bool,
    pub damage: u32,
    pub heal: u32,
}

pub fn combat_effect(slot_id: &str) -> Option<CombatEffect> {
    use CombatActionKind::{Item, Melee, Spell};
    let (kind, cooldown_ticks, max_range, requires_target, damage, heal) = match slot_id {
        SLOT_RUST_BLADE => (Melee, 12, 3.4, true, 2, 0),
        SLOT_EMBER_BOLT => (Spell, 20, 11.5, true, 3, 0),
        SLOT_FROST_BIND => (Spell, 29, 8.5, true, 2, 0),
        SLOT_BANDAGE => (Item, 42, 0.0, false, 0, 2),
        SLOT_BOMB => (Item, 33, 9.5, true, 4, 0),
        _ => return None,
    };
    Some(CombatEffect {
        kind,
        cooldown_ticks,
        max_range,
        requires_target,
        damage,
        heal,
    })
}

// ---------------------------------------------------------------------------
// Health / entities
// ---------------------------------------------------------------------------

pub const PLAYER_MAX_HEALTH: u32 = 10;

/// Ticks a defeated entity stays unavailable.
pub const ENTITY_RESPAWN_TICKS: u64 = 600;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Npc,
    WildMon,
}

impl EntityKind {
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "npc" => Some(Self::Npc),
            "wild-mon" => Some(Self::WildMon),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Npc => "npc",
            Self::WildMon => "wild-mon",
        }
    }

    pub fn max_health(self) -> u32 {
        match self {
            Self::Npc => 6,
            Self::WildMon => 8,
        }
    }
}

/// Parsed `"{chunkX}:{chunkZ}:{entityType}:{index}"` target id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntityTarget {
    pub chunk_x: i32,
    pub chunk_z: i32,
    pub kind: EntityKind,
    pub index: u32,
}

impl EntityTarget {
    /// `None` for ids that are not well-formed or name an unknown entity type.
    pub fn parse(target_id: &str) -> Option<Self> {
        let mut parts = target_id.split(':');
        let chunk_x = parts.next()?.parse().ok()?;
        let chunk_z = parts.next()?.parse().ok()?;
        let kind = EntityKind::parse(parts.next()?)?;
        let index = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            chunk_x,
            chunk_z,
            kind,
            index,
        })
    }
}

/// 32-bit FNV-1a.
pub fn fnv1a(text: &str) -> u32 {
    text.bytes().fold(2_166_136_261u32, |hash, byte| {
        (hash ^ byte as u32).wrapping_mul(16_777_619)
    })
}

fn add_grant(grants: &mut ResourceCounts, resource_id: &str, amount: u32) {
    *grants.entry(resource_id.to_string()).or_insert(0) += amount;
}

/// Loot for defeating `target_id` at `tick`: one salvage plus one rolled drop.
pub fn entity_loot(target_id: &str, kind: EntityKind, tick: u64) -> ResourceCounts {
    let mut grants = ResourceCounts::new();
    add_grant(&mut grants, "salvage", 1);
    let roll = fnv1a(&format!("{target_id}:{tick}")) % 100;
    let drop = match kind {
        EntityKind::WildMon => match roll {
            0..35 => "fiber",
            35..60 => "coal",
            60..80 => "iron_ore",
            _ => "salvage",
        },
        EntityKind::Npc => match roll {
            0..40 => "wood",
            40..70 => "fiber",
            _ => "salvage",
        },
    };
    add_grant(&mut grants, drop, 1);
    grants
}

// ---------------------------------------------------------------------------
// Blocks
// ---------------------------------------------------------------------------

/// Inclusive bound on chunk-local block coordinates.
pub const BLOCK_COORD_MAX: i32 = 64;

pub fn block_in_bounds(position: &BlockPosition) -> bool {
    [position.x, position.y, position.z]
        .iter()
        .all(|coord| (0..=BLOCK_COORD_MAX).contains(coord))
}

/// Product of two coordinates truncated to 32 bits.
fn mix(value: i32, factor: i64) -> i32 {
    (value as i64).wrapping_mul(factor) as i32
}

/// Deterministic 0..100 roll for breaking the block at `position`.
pub fn break_roll(position: &BlockPosition) -> u32 {
    let value = mix(position.chunk_x, 73_856_093)
        ^ mix(position.chunk_z, 19_349_663)
        ^ mix(position.x, 83_492_791)
        ^ mix(position.y, 1_237)
        ^ mix(position.z, 29_791);
    value.unsigned_abs() % 100
}

/// Resources granted for breaking a block: one salvage plus a tiered roll.
pub fn break_grants(position: &BlockPosition) -> ResourceCounts {
    let mut grants = ResourceCounts::new();
    add_grant(&mut grants, "salvage", 1);
    let drop = match break_roll(position) {
        0..30 => "wood",
        30..55 => "stone",
        55..75 => "fiber",
        75..90 => "coal",
        90..98 => "iron_ore",
        _ => "salvage",
    };
    add_grant(&mut grants, drop, 1);
    grants
}
