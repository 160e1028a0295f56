use crate::commands::CommandReport;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub fn run() -> CommandReport {
    let mut report = CommandReport::new("version");
    report.detail(VERSION);
    report.detail(format!("build={}", env!("BUILD_UUID")));
    report
}
