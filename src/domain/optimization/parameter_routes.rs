//! Where each strategy parameter lives in the configuration document.
//!
//! Both the optimizer (when it builds a search space from configured ranges)
//! and the persistence step read this table, so the list of fixed keys is
//! declared exactly once.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterRole {
    /// Defines the success condition; never searched or persisted
    Fixed,
    Tunable,
}

#[derive(Debug, Clone, Copy)]
pub struct ParameterRoute {
    pub name: &'static str,
    pub section: &'static [&'static str],
    pub role: ParameterRole,
}

const STRATEGY: &[&str] = &["strategy"];
const CONFIDENCE_WEIGHTS: &[&str] = &["strategy", "confidence_weights"];

pub const PARAMETER_ROUTES: &[ParameterRoute] = &[
    ParameterRoute {
        name: "rise_threshold",
        section: STRATEGY,
        role: ParameterRole::Fixed,
    },
    ParameterRoute {
        name: "max_days",
        section: STRATEGY,
        role: ParameterRole::Fixed,
    },
    ParameterRoute {
        name: "rsi_oversold_threshold",
        section: CONFIDENCE_WEIGHTS,
        role: ParameterRole::Tunable,
    },
    ParameterRoute {
        name: "rsi_low_threshold",
        section: CONFIDENCE_WEIGHTS,
        role: ParameterRole::Tunable,
    },
    ParameterRoute {
        name: "final_threshold",
        section: CONFIDENCE_WEIGHTS,
        role: ParameterRole::Tunable,
    },
    ParameterRoute {
        name: "dynamic_confidence_adjustment",
        section: CONFIDENCE_WEIGHTS,
        role: ParameterRole::Tunable,
    },
    ParameterRoute {
        name: "market_sentiment_weight",
        section: CONFIDENCE_WEIGHTS,
        role: ParameterRole::Tunable,
    },
    ParameterRoute {
        name: "trend_strength_weight",
        section: CONFIDENCE_WEIGHTS,
        role: ParameterRole::Tunable,
    },
];

pub fn route_for(name: &str) -> Option<&'static ParameterRoute> {
    PARAMETER_ROUTES.iter().find(|r| r.name == name)
}

pub fn is_tunable(name: &str) -> bool {
    route_for(name).is_some_and(|r| r.role == ParameterRole::Tunable)
}

pub fn fixed_names() -> impl Iterator<Item = &'static str> {
    PARAMETER_ROUTES
        .iter()
        .filter(|r| r.role == ParameterRole::Fixed)
        .map(|r| r.name)
}
