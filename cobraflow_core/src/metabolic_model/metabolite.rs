//! This module provides the metabolite struct representing a metabolite

use std::hash::Hash;

use derive_builder::Builder;

/// Represents a metabolite
#[derive(Builder, Debug, Clone)]
pub struct Metabolite {
    /// Used to identify the metabolite (must be unique), usually `<base>_<compartment>`
    pub id: String,
    /// Human Readable name of the metabolite
    #[builder(default = "None")]
    pub name: Option<String>,
    /// Which compartment the metabolite is in
    #[builder(default = "None")]
    pub compartment: Option<String>,
    /// Electrical charge of the Metabolite
    #[builder(default = "0")]
    pub charge: i32,
    /// Chemical Formula of the metabolite
    #[builder(default = "None")]
    pub formula: Option<String>,
    /// Notes about the metabolite
    #[builder(default = "None")]
    pub notes: Option<String>,
    /// Metabolite annotations
    #[builder(default = "None")]
    pub annotation: Option<String>,
}

impl Hash for Metabolite {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state); // Hash by id
                             // If the metabolite has an associated compartment, also hash by that
        if let Some(ref compartment) = self.compartment {
            compartment.hash(state)
        };
    }
}

/// Split a compartment qualified metabolite id into its base id and compartment
///
/// # Examples
/// ```rust
/// use cobraflow_core::metabolic_model::metabolite::split_compartment;
/// assert_eq!(split_compartment("atp_c"), ("atp", Some("c")));
/// assert_eq!(split_compartment("glc__D_e"), ("glc__D", Some("e")));
/// assert_eq!(split_compartment("biomass"), ("biomass", None));
/// ```
pub fn split_compartment(id: &str) -> (&str, Option<&str>) {
    match id.rsplit_once('_') {
        // Compartment ids are short, a long suffix is part of the base id
        Some((base, compartment))
            if !base.is_empty() && !compartment.is_empty() && compartment.len() <= 2 =>
        {
            (base, Some(compartment))
        }
        _ => (id, None),
    }
}

/// Base ids of cofactors whose shadow prices are reported alongside FBA results
const COENZYMES: [&str; 22] = [
    "atp", "adp", "amp", "nad", "nadh", "nadp", "nadph", "fad", "fadh2", "coa", "accoa", "q8",
    "q8h2", "mqn8", "mql8", "gtp", "gdp", "utp", "ctp", "h2o", "pi", "ppi",
];

/// Whether the metabolite `id` is a cofactor, in any compartment
pub fn is_coenzyme(id: &str) -> bool {
    let (base, _) = split_compartment(id);
    COENZYMES.contains(&base)
}
