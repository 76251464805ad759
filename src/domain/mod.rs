// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain structs, enums and traits that name the concepts of a
// launcher run. No burn types, no file I/O, no processes.
//
//   stage.rs      — phases and the clipped [stage, endstage] window
//   params.rs     — the immutable ParameterSet and its groups
//   descriptor.rs — structured model descriptor and its text form
//   job.rs        — checkpoint naming and the extraction matrix
//   error.rs      — LauncherError taxonomy
//   traits.rs     — external command seam

pub mod stage;

pub mod params;

pub mod descriptor;

pub mod job;

pub mod error;

pub mod traits;
