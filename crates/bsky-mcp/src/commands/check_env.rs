//! `check-env` subcommand: report credential variables without their values.

use crate::cli::CheckEnvArgs;
use crate::credentials::{
    EnvSource, EnvironmentReport, IDENTITY_HANDLE, IDENTITY_SECRET, ProcessEnv, SERVICE_ENDPOINT,
    environment_report,
};

/// Run the `check-env` subcommand against the process environment.
///
/// # Errors
///
/// Returns an error only if JSON serialization fails.
pub async fn run(args: CheckEnvArgs) -> anyhow::Result<()> {
    let report = report(&ProcessEnv);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", render(&report));
    }
    Ok(())
}

fn report(env: &dyn EnvSource) -> EnvironmentReport {
    environment_report(env)
}

fn render(report: &EnvironmentReport) -> String {
    let set = |present: bool| if present { "set" } else { "not set" };
    let mut out = String::new();
    out.push_str(&format!(
        "{IDENTITY_HANDLE:<17} {}\n",
        report.identity_handle.as_deref().unwrap_or("not set")
    ));
    out.push_str(&format!("{IDENTITY_SECRET:<17} {}\n", set(report.identity_secret_set)));
    out.push_str(&format!(
        "{SERVICE_ENDPOINT:<17} {}\n",
        match &report.service_endpoint {
            Some(url) => url.clone(),
            None => format!("not set (defaults to {})", report.effective_endpoint),
        }
    ));
    out.push_str(if report.lazy_login_possible {
        "\nLazy login is available.\n"
    } else {
        "\nLazy login is unavailable; use the login tool or set both variables.\n"
    });
    out
}
