pub mod bigfile;
pub mod img;
pub mod ini;
pub mod obd;
pub mod rms;
pub mod seq;
pub mod var;

pub use bigfile::{BigfileArchive, BigfileEntry};
pub use img::{ImgRegion, ImgTable};
pub use ini::{INI_NO_ACTOR_RESOURCE, IniFile, IniRecord};
pub use obd::{OBD_ATTR_NO_WALK, OBD_ATTR_STEP_TRIGGER, ObdFile};
pub use rms::RmsFile;
pub use seq::SeqTable;
pub use var::{VAR_INVENTORY_SWAP_DISABLED, VarTable};
