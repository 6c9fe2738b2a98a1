use std::process::ExitCode;

use vidlink_core::ServerProfile;

#[tokio::main]
async fn main() -> ExitCode {
    vidlink_gst::init_logging();
    vidlink_gst::app::run_server(ServerProfile::Relay).await
}
