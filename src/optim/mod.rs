pub mod assembler;
pub mod exchange;
pub mod nutri_eval;
pub mod optimizer;
pub mod ranker;
pub mod targets;
pub mod validation;
