//! Jattack core library: template model, hole resolution, execution and program output.

#[path = "runtime/checksum.rs"]
mod checksum;
#[path = "runtime/clock.rs"]
mod clock;
#[path = "runtime/compiler.rs"]
mod compiler;
#[path = "platform/config.rs"]
mod config;
#[path = "transform/dce.rs"]
mod dce;
#[path = "platform/error.rs"]
mod error;
#[path = "transform/filler.rs"]
mod filler;
#[path = "modes/generate.rs"]
mod generate;
#[path = "transform/harness.rs"]
mod harness;
#[path = "transform/holes.rs"]
mod holes;
#[path = "runtime/interp.rs"]
mod interp;
#[path = "model/itr.rs"]
mod itr;
#[path = "runtime/loader.rs"]
mod loader;
#[path = "model/node.rs"]
mod node;
#[path = "model/operator.rs"]
mod operator;
#[path = "transform/printer.rs"]
mod printer;
#[path = "runtime/random.rs"]
mod random;
#[path = "model/reporting.rs"]
mod reporting;
#[path = "modes/run.rs"]
mod run;
#[path = "runtime/session.rs"]
mod session;
#[path = "runtime/solver.rs"]
mod solver;
#[path = "model/template.rs"]
mod template;
#[path = "model/term.rs"]
mod term;
#[path = "model/value.rs"]
mod value;

pub use checksum::*;
pub use clock::*;
pub use compiler::*;
pub use config::*;
pub use dce::*;
pub use error::*;
pub use filler::*;
pub use generate::*;
pub use harness::*;
pub use holes::*;
pub use interp::*;
pub use itr::*;
pub use loader::*;
pub use node::*;
pub use operator::*;
pub use printer::*;
pub use random::*;
pub use reporting::*;
pub use run::*;
pub use session::*;
pub use solver::*;
pub use template::*;
pub use term::*;
pub use value::*;
