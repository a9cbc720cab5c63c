//! Rank ladder
//!
//! Ranks cover `[0, ∞)` with contiguous, non-overlapping XP ranges.

use serde::Serialize;

/// Rank definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rank {
    pub id: &'static str,
    pub name: &'static str,
    pub min_xp: u64,
    /// Inclusive upper bound, `None` for the top rank
    pub max_xp: Option<u64>,
    pub color: &'static str,
    pub icon: &'static str,
    pub benefits: &'static [&'static str],
}

impl Rank {
    pub fn contains(&self, xp: u64) -> bool {
        xp >= self.min_xp && self.max_xp.map_or(true, |max| xp <= max)
    }
}

/// All ranks, sorted by `min_xp`
pub static RANKS: &[Rank] = &[
    Rank {
        id: "soldado",
        name: "Soldado",
        min_xp: 0,
        max_xp: Some(999),
        color: "#39ff14",
        icon: "🎖️",
        benefits: &["Acceso a modo Campaña", "Problemas básicos"],
    },
    Rank {
        id: "sargento",
        name: "Sargento",
        min_xp: 1000,
        max_xp: Some(2999),
        color: "#00bfff",
        icon: "⭐",
        benefits: &["Modo Batalla Rápida", "Problemas intermedios", "+10% XP bonus"],
    },
    Rank {
        id: "capitan",
        name: "Capitán",
        min_xp: 3000,
        max_xp: Some(6999),
        color: "#ff073a",
        icon: "🏅",
        benefits: &[
            "Modo Supervivencia",
            "Problemas avanzados",
            "+20% XP bonus",
            "Acceso a enigmas",
        ],
    },
    Rank {
        id: "coronel",
        name: "Coronel",
        min_xp: 7000,
        max_xp: Some(14999),
        color: "#ffd700",
        icon: "🎗️",
        benefits: &[
            "Modo Multijugador",
            "Problemas expertos",
            "+30% XP bonus",
            "Crear salas privadas",
        ],
    },
    Rank {
        id: "general",
        name: "General",
        min_xp: 15000,
        max_xp: None,
        color: "#ff6b35",
        icon: "👑",
        benefits: &[
            "Todos los modos",
            "Problemas maestros",
            "+50% XP bonus",
            "Panel de liderazgo",
            "Insignias especiales",
        ],
    },
];

/// Rank holding `xp`; the lowest rank if nothing matches
pub fn rank_for_xp(xp: u64) -> &'static Rank {
    let above = RANKS.partition_point(|r| r.min_xp <= xp);
    above
        .checked_sub(1)
        .and_then(|i| RANKS.get(i))
        .unwrap_or(&RANKS[0])
}

pub fn rank_by_id(id: &str) -> Option<&'static Rank> {
    RANKS.iter().find(|r| r.id == id)
}

/// Current rank, the one after it, and how much XP is missing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NextRank {
    pub current: &'static Rank,
    pub next: Option<&'static Rank>,
    pub xp_needed: u64,
}

pub fn xp_to_next_rank(xp: u64) -> NextRank {
    let current = rank_for_xp(xp);
    let next = RANKS.iter().find(|r| r.min_xp > current.min_xp);
    let xp_needed = next.map_or(0, |n| n.min_xp.saturating_sub(xp));

    NextRank { current, next, xp_needed }
}

/// Fraction (0.0 - 1.0) of the way through the current rank
pub fn rank_progress(xp: u64) -> f32 {
    let NextRank { current, next, .. } = xp_to_next_rank(xp);
    match next {
        Some(next) => {
            let span = next.min_xp - current.min_xp;
            if span == 0 {
                1.0
            } else {
                (xp - current.min_xp) as f32 / span as f32
            }
        }
        None => 1.0,
    }
}

// ============= Python Bindings =============

/// (id, name, fraction of the way to the next rank) for a total XP
#[cfg(feature = "python")]
#[pyo3::pyfunction]
#[pyo3(name = "rank_for_xp")]
pub fn py_rank_for_xp(xp: u64) -> (String, String, f32) {
    let rank = rank_for_xp(xp);
    (rank.id.to_string(), rank.name.to_string(), rank_progress(xp))
}
