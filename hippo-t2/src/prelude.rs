//! 🧠欢迎光临🧪
//!
//! 涵盖了本 crate 一系列常用的功能.

pub use crate::{Idx2d, Idx3d};

pub use crate::{BinaryMask, NiftiHeaderAttr, ScalarVolume};
pub use crate::{Hemisphere, Hemispheres};
pub use crate::{PipelineError, Result, Stage};

pub use crate::consts::{DEFAULT_CSF_THRESHOLD_MS, MASK_BINARIZE_FRACTION, REPORT_FILE_NAME};

pub use crate::correction::{correct, CorrectedMask, CorrectionParams};
pub use crate::stats::{Asymmetry, HemisphereStats};

pub use crate::toolkit::{
    registrar_for, Bet, BrainExtraction, BrainExtractor, FlirtRegistrar, PsfRegistrar,
    Registrar, RegistrationStrategy, RigidTransform, ToolPaths,
};

pub use crate::pipeline::{InputSet, Pipeline, PipelineConfig, PipelineOutcome, ResolvedInputs};
pub use crate::report::ReportRecord;
