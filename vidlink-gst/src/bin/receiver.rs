use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    vidlink_gst::init_logging();
    vidlink_gst::app::run_receiver().await
}
