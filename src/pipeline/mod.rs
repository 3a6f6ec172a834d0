// Pipeline module
// Runs a comparison end to end and records its trace and report

pub mod config;
pub mod report;
pub mod run;
pub mod trace;

pub use config::{ConfigError, PipelineConfig, DEFAULT_REFERENCE_TICKS_PER_SECOND};
pub use report::{write_report, Report};
pub use run::{
    default_label, run_pipeline, InputKind, Inputs, Modality, PipelineContext, PipelineError,
    PipelineOutcome,
};
pub use trace::{read_trace_file, Stage, StageStatus, TraceEntry, TraceError, TraceWriter, Tracer};
