pub mod master_service;
pub mod slave_service;

pub use master_service::MasterService;
pub use slave_service::SlaveService;
