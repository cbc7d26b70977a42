//! Built-in dimuon cutflow processors
//!
//! Both processors produce the same [`MuonOutput`]: per dataset, the number
//! of muons (`<dataset>_pt`) and of muon pairs (`<dataset>_mass`), plus a
//! muon pt histogram and a dimuon invariant-mass histogram. They differ only
//! in the event view they read, so running either one over the same files
//! gives identical results.

use super::Processor;
use crate::accumulator::{Accumulable, Cutflow, Hist, RegularAxis};
use crate::schema::{Column, DataFrame, EventView};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};

const DEFAULT_PT_AXIS: RegularAxis = RegularAxis::new(50, 0.0, 500.0);
const DEFAULT_MASS_AXIS: RegularAxis = RegularAxis::new(30, 0.25, 300.0);

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MuonOutput {
    pub pt: Hist,
    pub mass: Hist,
    pub cutflow: Cutflow,
}

impl Accumulable for MuonOutput {
    fn identity() -> Self {
        Self::default()
    }

    fn combine(self, other: Self) -> Self {
        Self {
            pt: self.pt.combine(other.pt),
            mass: self.mass.combine(other.mass),
            cutflow: self.cutflow.combine(other.cutflow),
        }
    }
}

/// Muon kinematics for one chunk, flattened with per-entry multiplicities
struct Muons<'a> {
    counts: Vec<usize>,
    pt: &'a [f64],
    eta: &'a [f64],
    phi: &'a [f64],
    mass: &'a [f64],
}

#[derive(Debug, Clone, Copy)]
struct FourVector {
    e: f64,
    px: f64,
    py: f64,
    pz: f64,
}

impl FourVector {
    fn from_pt_eta_phi_m(pt: f64, eta: f64, phi: f64, mass: f64) -> Self {
        let (px, py, pz) = (pt * phi.cos(), pt * phi.sin(), pt * eta.sinh());
        let e = (px * px + py * py + pz * pz + mass * mass).sqrt();
        Self { e, px, py, pz }
    }

    fn add(self, other: Self) -> Self {
        Self {
            e: self.e + other.e,
            px: self.px + other.px,
            py: self.py + other.py,
            pz: self.pz + other.pz,
        }
    }

    fn mass(&self) -> f64 {
        let m2 = self.e * self.e - self.px * self.px - self.py * self.py - self.pz * self.pz;
        m2.max(0.0).sqrt()
    }
}

fn fill_output(
    dataset: &str,
    muons: &Muons<'_>,
    pt_axis: &RegularAxis,
    mass_axis: &RegularAxis,
) -> MuonOutput {
    let mut output = MuonOutput::identity();
    let mut offset = 0;
    let mut n_muons = 0u64;
    let mut n_pairs = 0u64;

    for &count in &muons.counts {
        let vectors: Vec<FourVector> = (offset..offset + count)
            .map(|i| {
                FourVector::from_pt_eta_phi_m(muons.pt[i], muons.eta[i], muons.phi[i], muons.mass[i])
            })
            .collect();
        output
            .pt
            .fill_many(pt_axis, dataset, muons.pt[offset..offset + count].iter().copied());

        for (i, first) in vectors.iter().enumerate() {
            for second in &vectors[i + 1..] {
                output.mass.fill(mass_axis, dataset, first.add(*second).mass());
            }
        }

        n_muons += count as u64;
        n_pairs += (count * count.saturating_sub(1) / 2) as u64;
        offset += count;
    }

    output.cutflow.add(format!("{dataset}_pt"), n_muons);
    output.cutflow.add(format!("{dataset}_mass"), n_pairs);
    output
}

fn check_lengths(muons: &Muons<'_>) -> anyhow::Result<()> {
    let total: usize = muons.counts.iter().sum();
    for (name, values) in [
        ("pt", muons.pt),
        ("eta", muons.eta),
        ("phi", muons.phi),
        ("mass", muons.mass),
    ] {
        if values.len() != total {
            bail!(
                "Muon {name} has {} values but the multiplicities add up to {total}",
                values.len()
            );
        }
    }
    Ok(())
}

/// Dimuon cutflow over NanoAOD-style collections
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuonCutflow {
    pub pt_axis: RegularAxis,
    pub mass_axis: RegularAxis,
}

impl Default for MuonCutflow {
    fn default() -> Self {
        Self {
            pt_axis: DEFAULT_PT_AXIS,
            mass_axis: DEFAULT_MASS_AXIS,
        }
    }
}

impl Processor for MuonCutflow {
    const NAME: &'static str = "muon_cutflow";
    type Output = MuonOutput;

    fn process(&self, events: &EventView) -> anyhow::Result<MuonOutput> {
        let collection = events.events()?.collection("Muon")?;
        let muons = Muons {
            counts: collection.counts().collect(),
            pt: collection.field("pt")?,
            eta: collection.field("eta")?,
            phi: collection.field("phi")?,
            mass: collection.field("mass")?,
        };
        Ok(fill_output(events.dataset(), &muons, &self.pt_axis, &self.mass_axis))
    }
}

/// Dimuon cutflow over the flat base frame.
///
/// Reads `nMuon` and the `Muon_*` branches, which may be jagged or, when the
/// frame was flattened, already concatenated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameMuonCutflow {
    pub pt_axis: RegularAxis,
    pub mass_axis: RegularAxis,
}

impl Default for FrameMuonCutflow {
    fn default() -> Self {
        Self {
            pt_axis: DEFAULT_PT_AXIS,
            mass_axis: DEFAULT_MASS_AXIS,
        }
    }
}

/// Borrow a column's contents, concatenating jagged lists into `scratch`
fn contents<'a>(
    frame: &'a DataFrame,
    name: &str,
    scratch: &'a mut Vec<f64>,
) -> anyhow::Result<&'a [f64]> {
    match frame.column(name)? {
        Column::Flat(values) => Ok(values.as_slice()),
        Column::Jagged(lists) => {
            scratch.extend(lists.iter().flatten().copied());
            Ok(scratch.as_slice())
        }
    }
}

impl Processor for FrameMuonCutflow {
    const NAME: &'static str = "frame_muon_cutflow";
    type Output = MuonOutput;

    fn process(&self, events: &EventView) -> anyhow::Result<MuonOutput> {
        let frame = events.frame()?;
        let counts = frame
            .column("nMuon")?
            .as_flat()
            .context("nMuon must be a flat branch")?
            .iter()
            .map(|&n| n as usize)
            .collect();

        let mut scratch: [Vec<f64>; 4] = Default::default();
        let [pt, eta, phi, mass] = &mut scratch;
        let muons = Muons {
            counts,
            pt: contents(frame, "Muon_pt", pt)?,
            eta: contents(frame, "Muon_eta", eta)?,
            phi: contents(frame, "Muon_phi", phi)?,
            mass: contents(frame, "Muon_mass", mass)?,
        };
        check_lengths(&muons)?;
        Ok(fill_output(events.dataset(), &muons, &self.pt_axis, &self.mass_axis))
    }
}
