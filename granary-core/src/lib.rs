pub mod attr_path;
pub mod eval;
pub mod fingerprint;
pub mod hash;
pub mod rules;
pub mod system;

pub use attr_path::{AttrPath, AttrPathGlob, GlobPart};
pub use eval::{Cursor, CursorRef, EvalError, PackageMeta};
pub use fingerprint::{Fingerprint, ParseFingerprintError};
pub use hash::sha256_hex;
pub use rules::{RuleTreeNode, RulesError, RulesRaw, ScrapeRule, default_rules};
pub use system::DEFAULT_SYSTEMS;
