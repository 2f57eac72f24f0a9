pub mod binding_manager;
pub mod code_manager;
pub mod delivery_manager;

pub use binding_manager::{create_shared_binding_service, AccountBindingService, LinkStatus, SharedBindingService};
pub use code_manager::{create_shared_code_manager, CodeValidity, LinkingCodeManager, SharedCodeManager};
pub use delivery_manager::{
    create_shared_delivery_controller, DeliveryModeController, ReconciliationReport, RepairOutcome,
    SharedDeliveryController,
};
