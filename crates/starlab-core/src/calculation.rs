// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Supernova energy and nickel-mass estimates for a line item.
//!
//! ```text
//! energy     = (4π · dist² · texp · λ · Δλ) / (c · zeroPoint) · 10^(-0.4·mass)
//! nickelMass = 1.2e-7 · (dist² / Δλ) · 10^(-0.4·mass) · (λ/500)²
//! ```
//!
//! Values are computed in IEEE-754 double precision with a fixed evaluation
//! order so that results already stored are reproduced bit for bit.

use std::f64::consts::PI;

use serde::{Deserialize, Serialize};

use crate::model::{CalcInputs, ScopeRecord};

/// Speed of light as used by stored results. Kept at 3.0e8, not the SI value.
pub const SPEED_OF_LIGHT: f64 = 3.0e8;

/// Nickel-mass scale factor.
pub const NICKEL_FACTOR: f64 = 1.2e-7;

/// Reference wavelength for the nickel-mass colour term.
pub const REFERENCE_LAMBDA: f64 = 500.0;

/// Optical constants of a scope that feed the formulas.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScopeOptics {
    pub lambda: f64,
    pub delta_lamb: f64,
    pub zero_point: f64,
}

impl From<&ScopeRecord> for ScopeOptics {
    fn from(scope: &ScopeRecord) -> Self {
        Self {
            lambda: scope.lambda,
            delta_lamb: scope.delta_lamb,
            zero_point: scope.zero_point,
        }
    }
}

/// Derived outputs for one line item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalcOutputs {
    pub res_en: f64,
    pub res_ni: f64,
}

/// Compute energy and nickel mass from a scope's optics and a calc's inputs.
///
/// Pure: identical inputs always give identical bits. Degenerate optics
/// (zero bandwidth or zero-point) follow IEEE semantics and yield infinities
/// or NaN rather than an error.
pub fn calculate(optics: ScopeOptics, inputs: CalcInputs) -> CalcOutputs {
    let CalcInputs {
        inp_mass,
        inp_texp,
        inp_dist,
    } = inputs;

    let dist_sq = inp_dist * inp_dist;
    let attenuation = 10f64.powf(-0.4 * inp_mass);

    let res_en = (4.0 * PI * dist_sq * inp_texp * optics.lambda * optics.delta_lamb)
        / (SPEED_OF_LIGHT * optics.zero_point)
        * attenuation;

    let colour = optics.lambda / REFERENCE_LAMBDA;
    let res_ni = NICKEL_FACTOR * (dist_sq / optics.delta_lamb) * attenuation * (colour * colour);

    CalcOutputs { res_en, res_ni }
}
