//! Handler der Geo-Verben

pub mod bbox_handler;
pub mod pget_handler;
pub mod projektion_handler;

pub use bbox_handler::BboxHandler;
pub use pget_handler::PgetHandler;
pub use projektion_handler::ProjektionHandler;
