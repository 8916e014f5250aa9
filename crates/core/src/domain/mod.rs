pub mod experiment;
pub mod guardrail;
pub mod lever;
pub mod reference;
pub mod run;
