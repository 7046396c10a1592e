pub mod settings_cmd;
pub mod tracker_cmd;
pub mod transfer_cmd;
