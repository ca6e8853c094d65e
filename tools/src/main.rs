//! commission-runner: headless driver for the commission engine.
//!
//! Usage:
//!   commission-runner --db book.db --tenant acme --policy pol-00042
//!   commission-runner --db book.db --tenant acme --resync --export out.csv
//!   commission-runner --tenant demo --demo-seed 7 --demo-policies 500 --resync --summary
//!   commission-runner --db book.db --ipc-mode

mod demo;

use anyhow::Result;
use commission_core::{
    config::CommissionConfig,
    engine::CommissionEngine,
    reconciliation::ResyncReport,
    store::CommissionStore,
};
use std::env;
use std::io::{self, BufRead, Write};

#[derive(serde::Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum IpcCommand {
    Calculate { tenant_id: String, policy_id: String },
    Preview { tenant_id: String, policy_id: String },
    Resync { tenant_id: String },
    Summary { tenant_id: String },
    Quit,
}

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let ipc_mode = args.iter().any(|a| a == "--ipc-mode");
    let resync = args.iter().any(|a| a == "--resync");
    let summary = args.iter().any(|a| a == "--summary");
    let db = flag_value(&args, "--db").unwrap_or(":memory:");
    let data_dir = flag_value(&args, "--data-dir").unwrap_or("./data");
    let tenant = flag_value(&args, "--tenant").unwrap_or("demo");
    let policy = flag_value(&args, "--policy");
    let export = flag_value(&args, "--export");
    let demo_seed: Option<u64> = flag_value(&args, "--demo-seed").and_then(|s| s.parse().ok());
    let demo_policies = parse_arg(&args, "--demo-policies", 200usize);

    let config = CommissionConfig::load(data_dir)?;
    let store = CommissionStore::open(db)?;
    store.migrate()?;

    if let Some(seed) = demo_seed {
        let book = demo::seed_demo_book(&store, tenant, seed, demo_policies)?;
        log::info!(
            "seeded tenant {tenant}: {} tiers, {} parties, {} grids, {} policies",
            book.tiers, book.parties, book.grids, book.policies
        );
    }

    let engine = CommissionEngine::new(store, config);

    if ipc_mode {
        return run_ipc_loop(&engine);
    }

    if let Some(policy_id) = policy {
        let dist = engine.calculate_policy_commission(tenant, policy_id)?;
        println!("{}", serde_json::to_string_pretty(&dist)?);
    }

    if resync {
        let report = engine.resync_tenant_commissions(tenant)?;
        print_resync(&report);
    }

    if let Some(path) = export {
        let file = std::fs::File::create(path)
            .map_err(|e| anyhow::anyhow!("Cannot create {path}: {e}"))?;
        let rows = engine.export_csv(tenant, io::BufWriter::new(file))?;
        println!("exported {rows} rows to {path}");
    }

    if summary {
        let s = engine.summary(tenant)?;
        println!("=== COMMISSION SUMMARY ({}) ===", s.tenant_id);
        println!("  policies:            {}", s.policies);
        println!("  premium:             {}", s.premium);
        println!("  insurer commission:  {}", s.insurer_commission);
        println!("  agent commission:    {}", s.agent_commission);
        println!("  misp commission:     {}", s.misp_commission);
        println!("  employee commission: {}", s.employee_commission);
        println!("  broker share:        {}", s.broker_share);
        println!("  overrides used:      {}", s.overrides_used);
        for (source, t) in &s.by_source {
            println!(
                "  {source:<9} | {:>5} policies | insurer {} | party {} | broker {}",
                t.policies, t.insurer_commission, t.party_commission, t.broker_share
            );
        }
        if !s.is_balanced() {
            log::error!("summary totals do not balance for tenant {}", s.tenant_id);
        }
    }

    Ok(())
}

fn run_ipc_loop(engine: &CommissionEngine) -> Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut handle = stdin.lock();
    let mut buffer = String::new();

    loop {
        buffer.clear();
        let bytes_read = handle.read_line(&mut buffer)?;
        if bytes_read == 0 {
            break; // EOF
        }

        let cmd: IpcCommand = match serde_json::from_str(&buffer) {
            Ok(c) => c,
            Err(e) => {
                let err_json = serde_json::json!({ "error": e.to_string() });
                writeln!(stdout, "{}", err_json)?;
                stdout.flush()?;
                continue;
            }
        };

        let reply = match cmd {
            IpcCommand::Quit => break,
            IpcCommand::Calculate { tenant_id, policy_id } => {
                to_reply(engine.calculate_policy_commission(&tenant_id, &policy_id))
            }
            IpcCommand::Preview { tenant_id, policy_id } => {
                to_reply(engine.preview_policy_commission(&tenant_id, &policy_id))
            }
            IpcCommand::Resync { tenant_id } => to_reply(engine.resync_tenant_commissions(&tenant_id)),
            IpcCommand::Summary { tenant_id } => to_reply(engine.summary(&tenant_id)),
        };
        writeln!(stdout, "{}", reply)?;
        stdout.flush()?;
    }
    Ok(())
}

/// Success as `{"ok": ...}`; failure keeps the specific reason so the UI
/// can tell a missing grid from a missing party.
fn to_reply<T: serde::Serialize>(result: commission_core::error::CommissionResult<T>) -> serde_json::Value {
    match result {
        Ok(value) => serde_json::json!({ "ok": value }),
        Err(e) => serde_json::json!({ "error": { "reason": e.reason_code(), "message": e.to_string() } }),
    }
}

fn print_resync(report: &ResyncReport) {
    println!("=== RESYNC {} ===", report.run_id);
    println!("  tenant:        {}", report.tenant_id);
    println!("  succeeded:     {}", report.succeeded.len());
    println!("  unchanged:     {}", report.unchanged);
    println!("  failed:        {}", report.failed.len());
    for f in &report.failed {
        println!("    {} [{}] {}", f.policy_id, f.reason, f.message);
    }
    if report.cancelled {
        println!("  cancelled, not attempted: {}", report.not_attempted.len());
    }
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.windows(2).find(|w| w[0] == flag).map(|w| w[1].as_str())
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}
