//! Problem parameters for one planning attempt.
//!
//! Every field has a serde default equal to the reference scenario, so a scenario
//! file only needs to name what it changes. Per-node profiles missing from the file
//! are filled by [`Parameters::fitted_to`].

use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::error::PlanError;
use crate::model::NodeLayout;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Waste generation profile of one customer.
pub struct CustomerProfile {
    /// Total waste to clear, in tonnes.
    pub mass_tonnes: f64,
    /// Demolition duration in periods.
    pub demolition_periods: usize,
}

impl CustomerProfile {
    /// Reference profile for the `local`-th customer.
    #[must_use]
    pub fn reference(local: usize) -> Self {
        let (mass_tonnes, demolition_periods) = match local {
            0 => (120.0, 2),
            1 => (200.0, 1),
            2 => (180.0, 3),
            _ => (100.0, 2),
        };
        Self {
            mass_tonnes,
            demolition_periods,
        }
    }

    /// Tonnes released in each active demolition period.
    #[must_use]
    #[expect(
        clippy::cast_precision_loss,
        reason = "demolition durations are a handful of periods"
    )]
    pub fn release_per_period(&self) -> f64 {
        self.mass_tonnes / self.demolition_periods as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// Cost and capacity profile of one intermediate site.
pub struct SiteProfile {
    /// One-off cost for opening the site.
    pub establishment_cost: f64,
    /// Cost per period while the site is needed.
    pub operating_cost_per_period: f64,
    /// Storage capacity in tonnes.
    pub capacity_tonnes: f64,
}

impl Default for SiteProfile {
    fn default() -> Self {
        Self {
            establishment_cost: 8000.0,
            operating_cost_per_period: 1500.0,
            capacity_tonnes: 25_000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/// A homogeneous vehicle fleet serving one echelon.
pub struct Fleet {
    /// Vehicles available per period.
    pub size: usize,
    /// Load per trip in tonnes.
    pub capacity_tonnes: f64,
    /// Average speed in km/h.
    pub speed_kmh: f64,
    /// Cost per kilometre driven.
    pub cost_per_km: f64,
}

impl Fleet {
    /// Reference collection fleet (customers to intermediate sites).
    #[must_use]
    pub const fn collection() -> Self {
        Self {
            size: 1,
            capacity_tonnes: 50.0,
            speed_kmh: 25.0,
            cost_per_km: 100.0,
        }
    }

    /// Reference transport fleet (intermediate sites to final sites).
    #[must_use]
    pub const fn transport() -> Self {
        Self {
            size: 1,
            capacity_tonnes: 40.0,
            speed_kmh: 30.0,
            cost_per_km: 150.0,
        }
    }

    /// One-way driving time in minutes for `distance_km`.
    #[must_use]
    pub fn travel_minutes(&self, distance_km: f64) -> f64 {
        distance_km / self.speed_kmh * 60.0
    }

    /// Driving minutes the whole fleet can spend in one period.
    #[must_use]
    #[expect(clippy::cast_precision_loss, reason = "fleet sizes are small counts")]
    pub fn minutes_per_period(&self, working_minutes: f64) -> f64 {
        self.size as f64 * working_minutes
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
/// How the per-site operating-cost accumulator is tied to the completion indicators.
pub enum AccrualMode {
    /// Accumulator bounded above by the still-needed periods, with a full-horizon
    /// allowance for closed sites.
    #[default]
    Bounded,
    /// Open sites are charged at least one rate per stalled period.
    Charged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
/// Immutable parameters of one planning attempt.
pub struct Parameters {
    /// Per-customer profiles, in customer order.
    pub customers: Vec<CustomerProfile>,
    /// Per-site profiles, in site order.
    pub sites: Vec<SiteProfile>,
    /// Demolition machines working simultaneously.
    pub machines: usize,
    /// Collection fleet.
    pub collection: Fleet,
    /// Transport fleet.
    pub transport: Fleet,
    /// Fraction of site intake that needs no onward transport, in `[0, 1)`.
    pub recycling_fraction: f64,
    /// Working minutes per vehicle per period.
    pub working_minutes: f64,
    /// Number of planning periods.
    pub horizon: usize,
    /// Distance substituted for pairs without a road path.
    pub unreachable_distance_km: f64,
    /// Require at least one collection trip out of the depot every period.
    pub require_daily_dispatch: bool,
    /// Operating-cost accrual rule.
    pub operating_cost_accrual: AccrualMode,
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            customers: Vec::new(),
            sites: Vec::new(),
            machines: 1,
            collection: Fleet::collection(),
            transport: Fleet::transport(),
            recycling_fraction: 0.35,
            working_minutes: 150.0,
            horizon: 6,
            unreachable_distance_km: 9_999_999.0,
            require_daily_dispatch: true,
            operating_cost_accrual: AccrualMode::Bounded,
        }
    }
}

impl Parameters {
    /// Reference parameters sized for `layout`.
    #[must_use]
    pub fn with_defaults(layout: &NodeLayout) -> Self {
        Self::default().fitted_to(layout)
    }

    /// Fill missing per-node profiles with reference values.
    ///
    /// Extra profiles beyond the layout are kept so [`Parameters::validate`] can reject them.
    #[must_use]
    pub fn fitted_to(mut self, layout: &NodeLayout) -> Self {
        let known = self.customers.len();
        self.customers
            .extend((known..layout.customer_count()).map(CustomerProfile::reference));
        let known = self.sites.len();
        self.sites.extend(
            (known..layout.site_count()).map(|_| SiteProfile::default()),
        );
        self
    }

    /// Planning periods `1..=horizon`.
    #[must_use]
    pub fn periods(&self) -> RangeInclusive<usize> {
        1..=self.horizon
    }

    /// Total waste over all customers.
    #[must_use]
    pub fn total_mass(&self) -> f64 {
        self.customers.iter().map(|customer| customer.mass_tonnes).sum()
    }

    /// Check the parameters against `layout`.
    ///
    /// # Errors
    ///
    /// Returns [`PlanError::InvalidParameters`] describing the first problem found.
    pub fn validate(&self, layout: &NodeLayout) -> Result<(), PlanError> {
        let invalid = |msg: String| Err(PlanError::InvalidParameters(msg));

        if self.customers.len() != layout.customer_count() {
            return invalid(format!(
                "{} customer profiles for {} customers",
                self.customers.len(),
                layout.customer_count()
            ));
        }
        if self.sites.len() != layout.site_count() {
            return invalid(format!(
                "{} site profiles for {} intermediate sites",
                self.sites.len(),
                layout.site_count()
            ));
        }
        if self.horizon == 0 {
            return invalid("horizon must be at least one period".to_owned());
        }
        if self.machines == 0 {
            return invalid("at least one demolition machine is required".to_owned());
        }
        if !(0.0..1.0).contains(&self.recycling_fraction) {
            return invalid(format!(
                "recycling fraction {} outside [0, 1)",
                self.recycling_fraction
            ));
        }
        if !positive(self.working_minutes) {
            return invalid("working minutes must be positive".to_owned());
        }
        if !positive(self.unreachable_distance_km) {
            return invalid("unreachable distance sentinel must be positive".to_owned());
        }
        for (label, fleet) in [("collection", &self.collection), ("transport", &self.transport)] {
            if fleet.size == 0 || !positive(fleet.capacity_tonnes) || !positive(fleet.speed_kmh) {
                return invalid(format!(
                    "{label} fleet needs positive size, capacity, and speed"
                ));
            }
            if !non_negative(fleet.cost_per_km) {
                return invalid(format!("{label} fleet cost per km is negative"));
            }
        }
        for (index, customer) in self.customers.iter().enumerate() {
            if !positive(customer.mass_tonnes) || customer.demolition_periods == 0 {
                return invalid(format!(
                    "customer {index} needs positive mass and demolition duration"
                ));
            }
            if customer.demolition_periods > self.horizon {
                return invalid(format!(
                    "customer {index} demolition takes {} periods, horizon is {}",
                    customer.demolition_periods, self.horizon
                ));
            }
        }
        for (index, site) in self.sites.iter().enumerate() {
            if !positive(site.capacity_tonnes) {
                return invalid(format!("site {index} needs positive capacity"));
            }
            if !non_negative(site.establishment_cost) || !non_negative(site.operating_cost_per_period) {
                return invalid(format!("site {index} has a negative cost"));
            }
        }
        Ok(())
    }
}

/// Finite and strictly above zero; NaN fails.
fn positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Finite and not below zero; NaN fails.
fn non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}
