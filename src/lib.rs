pub mod emission;
pub mod evidence;
pub mod hmm;
pub mod importance;
pub mod io;
pub mod lookup;
pub mod model;
pub mod opt;
pub mod progress;
pub mod report;
pub mod transition;
pub mod utils;

pub use evidence::{Genealogy, LocusData, Realizations};
pub use lookup::NormalTables;
pub use model::SelectionModel;
