use anyhow::{Result, bail};

/// One sampled genealogy at the focal locus: coalescence times among the
/// derived-allele lineages and among the ancestral-allele lineages.
#[derive(Debug, Clone, PartialEq)]
pub struct Genealogy {
    pub n_derived: usize,
    pub n_ancestral: usize,
    derived: Vec<f64>,
    ancestral: Vec<f64>,
}

impl Genealogy {
    /// Negative times mark unobserved coalescences and are dropped.
    pub fn new(
        n_derived: usize,
        n_ancestral: usize,
        derived: &[f64],
        ancestral: &[f64],
    ) -> Result<Self> {
        let derived = observed_sorted(derived)?;
        let ancestral = observed_sorted(ancestral)?;
        if derived.len() > n_derived.saturating_sub(1) {
            bail!(
                "{} derived coalescence times for {} derived lineages",
                derived.len(),
                n_derived
            );
        }
        if ancestral.len() > n_ancestral.saturating_sub(1) {
            bail!(
                "{} ancestral coalescence times for {} ancestral lineages",
                ancestral.len(),
                n_ancestral
            );
        }
        Ok(Self {
            n_derived,
            n_ancestral,
            derived,
            ancestral,
        })
    }

    pub fn derived_times(&self) -> &[f64] {
        &self.derived
    }

    pub fn ancestral_times(&self) -> &[f64] {
        &self.ancestral
    }

    /// Derived lineages still uncoalesced at `time`.
    pub fn derived_remaining(&self, time: f64) -> usize {
        self.n_derived - self.derived.partition_point(|t| *t < time)
    }

    /// Ancestral lineages still uncoalesced at `time`.
    pub fn ancestral_remaining(&self, time: f64) -> usize {
        self.n_ancestral - self.ancestral.partition_point(|t| *t < time)
    }
}

fn observed_sorted(times: &[f64]) -> Result<Vec<f64>> {
    if times.iter().any(|t| t.is_nan()) {
        bail!("coalescence times contain NaN");
    }
    let mut out: Vec<f64> = times.iter().copied().filter(|t| *t >= 0.0).collect();
    out.sort_by(|a, b| a.total_cmp(b));
    Ok(out)
}

/// Genealogical evidence for the locus, resolved once at load time.
#[derive(Debug, Clone, PartialEq)]
pub enum Realizations {
    NoEvidence,
    Single(Genealogy),
    Multiple(Vec<Genealogy>),
}

impl Realizations {
    pub fn from_vec(mut draws: Vec<Genealogy>) -> Self {
        match draws.len() {
            0 => Self::NoEvidence,
            1 => Self::Single(draws.remove(0)),
            _ => Self::Multiple(draws),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::NoEvidence => 0,
            Self::Single(_) => 1,
            Self::Multiple(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Any realization; all share the same sample sizes.
    pub fn first(&self) -> Option<&Genealogy> {
        match self {
            Self::NoEvidence => None,
            Self::Single(g) => Some(g),
            Self::Multiple(v) => v.first(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DiploidRecord {
    pub time: f64,
    /// Log-likelihoods of the AA, AD, DD genotypes.
    pub log_gl: [f64; 3],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HaploidRecord {
    pub time: f64,
    /// Log-likelihoods of carrying A or D.
    pub log_gl: [f64; 2],
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AncientSamples {
    pub diploid: Vec<DiploidRecord>,
    pub haploid: Vec<HaploidRecord>,
}

impl AncientSamples {
    pub fn is_empty(&self) -> bool {
        self.diploid.is_empty() && self.haploid.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diploid.len() + self.haploid.len()
    }

    pub fn latest_time(&self) -> Option<f64> {
        self.diploid
            .iter()
            .map(|r| r.time)
            .chain(self.haploid.iter().map(|r| r.time))
            .fold(None, |acc: Option<f64>, t| Some(acc.map_or(t, |a| a.max(t))))
    }
}

#[derive(Debug, Clone)]
pub struct LocusData {
    pub realizations: Realizations,
    pub ancient: AncientSamples,
}

impl LocusData {
    /// Rejects a locus that carries no evidence at all.
    pub fn new(realizations: Realizations, ancient: AncientSamples) -> Result<Self> {
        if realizations.is_empty() && ancient.is_empty() {
            bail!("no coalescence times and no ancient samples supplied; nothing to infer from");
        }
        if let Realizations::Multiple(draws) = &realizations {
            let Some(head) = draws.first() else {
                bail!("realization set is empty; use NoEvidence for a locus without genealogies");
            };
            let (n, m) = (head.n_derived, head.n_ancestral);
            if draws.iter().any(|g| g.n_derived != n || g.n_ancestral != m) {
                bail!("all realizations of a locus must share the same sample sizes");
            }
        }
        Ok(Self {
            realizations,
            ancient,
        })
    }

    pub fn has_coalescences(&self) -> bool {
        !self.realizations.is_empty()
    }
}
