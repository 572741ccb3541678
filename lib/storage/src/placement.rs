use common::{SiteId, SystemConfig, VariableId};

/// Sites hosting a copy of `var`: every site for replicated (even) variables,
/// only the home site for odd ones.
pub fn sites_hosting(config: &SystemConfig, var: VariableId) -> Vec<SiteId> {
    if var.is_replicated() {
        (1..=config.num_sites).map(SiteId::new).collect()
    } else {
        vec![config.home_site(var)]
    }
}

/// All variables with a copy at `site`, ascending.
pub fn variables_at(config: &SystemConfig, site: SiteId) -> Vec<VariableId> {
    (1..=config.num_variables)
        .map(VariableId::new)
        .filter(|var| var.is_replicated() || config.home_site(*var) == site)
        .collect()
}

/// The odd variables homed exclusively at `site`; recovery makes exactly these
/// readable again, so they are the ones whose waiters get re-examined.
pub fn odd_variables_homed_at(config: &SystemConfig, site: SiteId) -> Vec<VariableId> {
    (1..=config.num_variables)
        .map(VariableId::new)
        .filter(|var| !var.is_replicated() && config.home_site(*var) == site)
        .collect()
}
