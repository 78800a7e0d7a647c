use std::path::{Path, PathBuf};

mod terminal;

use anyhow::Context;
use clap::ArgAction;
use terminal::Colorize;

use acopio::{
    AllocationRequest, AssignmentId, AssignmentOptions, Config, JsonDirectory, LineInput,
    Priority, Registry, ReceivedQuantity, ReqNumber, Requirement, RequirementDraft,
    RequirementState, Roster, Statistics,
};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

/// Parse a requirement number from a string, normalizing to uppercase.
///
/// This is a CLI boundary function that accepts lowercase input
/// and normalizes it before parsing.
fn parse_number(s: &str) -> Result<ReqNumber, String> {
    s.to_uppercase().parse().map_err(|e| format!("{e}"))
}

/// Parse a line definition: `PRODUCT|SKU|BRAND|NAME|QTY[|USD[|PEN]]`.
fn parse_line(s: &str) -> Result<LineInput, String> {
    let parts: Vec<&str> = s.split('|').collect();
    if parts.len() < 5 || parts.len() > 7 {
        return Err(format!(
            "expected PRODUCT|SKU|BRAND|NAME|QTY[|USD[|PEN]], got '{s}'"
        ));
    }

    let requested = parts[4]
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid quantity '{}'", parts[4]))?;
    let estimated_unit_price_usd = parts
        .get(5)
        .map(|p| p.trim().parse::<f64>().map_err(|_| format!("invalid USD price '{p}'")))
        .transpose()?;
    let target_sale_price_pen = parts
        .get(6)
        .map(|p| p.trim().parse::<f64>().map_err(|_| format!("invalid PEN price '{p}'")))
        .transpose()?;

    Ok(LineInput {
        product_id: parts[0].trim().to_string(),
        sku: parts[1].trim().to_string(),
        brand: parts[2].trim().to_string(),
        name: parts[3].trim().to_string(),
        requested,
        estimated_unit_price_usd,
        target_sale_price_pen,
    })
}

/// Parse a product quantity: `PRODUCT=QTY`.
fn parse_quantity(s: &str) -> Result<(String, u32), String> {
    let (product, quantity) = s
        .split_once('=')
        .ok_or_else(|| format!("expected PRODUCT=QTY, got '{s}'"))?;
    let quantity = quantity
        .trim()
        .parse::<u32>()
        .map_err(|_| format!("invalid quantity '{quantity}'"))?;
    Ok((product.trim().to_string(), quantity))
}

fn parse_allocation(s: &str) -> Result<AllocationRequest, String> {
    let (product_id, quantity) = parse_quantity(s)?;
    Ok(AllocationRequest {
        product_id,
        quantity,
    })
}

fn parse_received(s: &str) -> Result<ReceivedQuantity, String> {
    let (product_id, quantity) = parse_quantity(s)?;
    Ok(ReceivedQuantity {
        product_id,
        quantity,
    })
}

/// Parse a date as `YYYY-MM-DD` into a UTC midnight timestamp.
fn parse_date(s: &str) -> Result<DateTime<Utc>, String> {
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("{e}"))?;
    let midnight = date
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| "invalid time".to_string())?;
    Ok(Utc.from_utc_datetime(&midnight))
}

fn open_registry(root: &Path) -> anyhow::Result<Registry<JsonDirectory, Roster>> {
    let config_path = root.join("config.toml");
    let config = if config_path.exists() {
        Config::load(&config_path).map_err(|e| anyhow::anyhow!("{e}"))?
    } else {
        Config::default()
    };

    let roster_path = root.join("parties.toml");
    let parties = if roster_path.exists() {
        Roster::load(&roster_path).with_context(|| {
            format!("failed to load party roster from {}", roster_path.display())
        })?
    } else {
        Roster::from_parties(Vec::new())?
    };

    Ok(Registry::new(
        JsonDirectory::open(root.to_path_buf()),
        parties,
        config,
    ))
}

fn confirm(prompt: &str) -> anyhow::Result<()> {
    eprint!("{prompt} (y/N) ");
    use std::io::{self, BufRead};
    let stdin = io::stdin();
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    if !line.trim().eq_ignore_ascii_case("y") {
        println!("Cancelled");
        std::process::exit(130);
    }
    Ok(())
}

#[derive(Debug, clap::Parser)]
#[command(version, about)]
pub struct Cli {
    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// The path to the root of the requirement store
    #[arg(short, long, default_value = ".", global = true)]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    pub fn run(self) -> anyhow::Result<()> {
        Self::setup_logging(self.verbose);

        self.command.run(self.root)
    }

    fn setup_logging(verbosity: u8) {
        use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

        let level = match verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            2 => tracing::Level::DEBUG,
            _ => tracing::Level::TRACE,
        };

        let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_thread_names(false)
            .with_line_number(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .init();
    }
}

#[derive(Debug, clap::Parser)]
pub enum Command {
    /// Initialize a new requirement store
    Init,

    /// Register a new requirement
    Create(Create),

    /// Approve a pending requirement
    Approve(Approve),

    /// Assign a responsible party to cover pending quantities
    Assign(Assign),

    /// Link a purchase order to an assignment
    Purchase(Purchase),

    /// Link a transfer record to an assignment
    Transit(Transit),

    /// Record received quantities for an assignment
    Receive(Receive),

    /// Cancel an assignment, or a whole requirement
    Cancel(Cancel),

    /// Show one requirement in full
    Show(Show),

    /// List requirements with filters
    List(List),

    /// Fleet-wide statistics (full scan)
    Stats(Stats),
}

impl Command {
    fn run(self, root: PathBuf) -> anyhow::Result<()> {
        match self {
            Self::Init => Init::run(&root)?,
            Self::Create(command) => command.run(&root)?,
            Self::Approve(command) => command.run(&root)?,
            Self::Assign(command) => command.run(&root)?,
            Self::Purchase(command) => command.run(&root)?,
            Self::Transit(command) => command.run(&root)?,
            Self::Receive(command) => command.run(&root)?,
            Self::Cancel(command) => command.run(&root)?,
            Self::Show(command) => command.run(&root)?,
            Self::List(command) => command.run(&root)?,
            Self::Stats(command) => command.run(&root)?,
        }
        Ok(())
    }
}

struct Init {}

impl Init {
    fn run(root: &Path) -> anyhow::Result<()> {
        use std::fs;

        let config_path = root.join("config.toml");
        if config_path.exists() {
            anyhow::bail!("Store already initialized (found existing config.toml)");
        }

        fs::create_dir_all(root)
            .map_err(|e| anyhow::anyhow!("Failed to create store directory: {e}"))?;

        Config::default()
            .save(&config_path)
            .map_err(|e| anyhow::anyhow!("Failed to create config.toml: {e}"))?;

        let roster_path = root.join("parties.toml");
        if !roster_path.exists() {
            Roster::from_parties(Vec::new())?.save(&roster_path)?;
        }

        println!("Initialized requirement store in {}", root.display());
        println!("  Created: config.toml");
        println!("  Created: parties.toml");
        println!();
        println!("Next steps:");
        println!("  add parties to parties.toml");
        println!("  acopio create --title \"...\" --line \"PRODUCT|SKU|BRAND|NAME|QTY\"");

        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Create {
    /// Short description of the need
    #[clap(long, short)]
    title: String,

    /// One line per product: `PRODUCT|SKU|BRAND|NAME|QTY[|USD[|PEN]]`
    #[clap(long = "line", short, required = true, value_parser = parse_line)]
    lines: Vec<LineInput>,

    /// Priority (low, normal, high, urgent)
    #[clap(long, default_value = "normal")]
    priority: Priority,

    /// Who registered the need
    #[clap(long)]
    requested_by: Option<String>,

    /// Free-text notes
    #[clap(long, default_value = "")]
    notes: String,
}

impl Create {
    fn run(self, root: &Path) -> anyhow::Result<()> {
        let registry = open_registry(root)?;

        let requirement = registry.create(
            RequirementDraft {
                title: self.title,
                priority: self.priority,
                requested_by: self.requested_by,
                notes: self.notes,
            },
            self.lines,
        )?;

        println!(
            "{}",
            format!("Registered requirement {}", requirement.number()).success()
        );
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Approve {
    /// The requirement number, e.g. REQ-2026-0001
    #[clap(value_parser = parse_number)]
    number: ReqNumber,

    /// Who is approving
    #[clap(long)]
    by: String,
}

impl Approve {
    fn run(self, root: &Path) -> anyhow::Result<()> {
        let registry = open_registry(root)?;
        let requirement = registry.find_by_number(self.number)?;
        let approved = registry.approve(requirement.id(), &self.by)?;

        println!(
            "{}",
            format!("Approved {} ({})", approved.number(), approved.title()).success()
        );
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Assign {
    /// The requirement number
    #[clap(value_parser = parse_number)]
    number: ReqNumber,

    /// The responsible party's id (see parties.toml)
    party: String,

    /// One allocation per product: `PRODUCT=QTY`
    #[clap(long = "item", short, required = true, value_parser = parse_allocation)]
    items: Vec<AllocationRequest>,

    /// Estimated arrival date (YYYY-MM-DD); defaults to the party's next trip
    #[clap(long, value_parser = parse_date)]
    eta: Option<DateTime<Utc>>,

    /// Estimated purchase date (YYYY-MM-DD)
    #[clap(long, value_parser = parse_date)]
    purchase_by: Option<DateTime<Utc>>,

    /// Estimated total cost in USD
    #[clap(long)]
    cost: Option<f64>,

    /// Free-text notes
    #[clap(long)]
    notes: Option<String>,
}

impl Assign {
    fn run(self, root: &Path) -> anyhow::Result<()> {
        let registry = open_registry(root)?;
        let requirement = registry.find_by_number(self.number)?;

        let assignment = registry.assign_responsible(
            requirement.id(),
            &self.party,
            &self.items,
            AssignmentOptions {
                estimated_purchase_at: self.purchase_by,
                estimated_arrival: self.eta,
                estimated_cost_usd: self.cost,
                notes: self.notes,
            },
        )?;

        println!(
            "{}",
            format!(
                "Assigned {} ({}) on {}: {}",
                assignment.party().display_name,
                assignment.party().code,
                self.number,
                assignment.id()
            )
            .success()
        );
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Purchase {
    /// The requirement number
    #[clap(value_parser = parse_number)]
    number: ReqNumber,

    /// The assignment id
    assignment: String,

    /// The purchase order reference
    order: String,
}

impl Purchase {
    fn run(self, root: &Path) -> anyhow::Result<()> {
        let registry = open_registry(root)?;
        let requirement = registry.find_by_number(self.number)?;
        let assignment_id = AssignmentId::from(self.assignment.as_str());

        let updated =
            registry.link_purchase_order(requirement.id(), &assignment_id, &self.order)?;

        println!(
            "{}",
            format!("Linked order {} to {}", self.order, updated.id()).success()
        );
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Transit {
    /// The requirement number
    #[clap(value_parser = parse_number)]
    number: ReqNumber,

    /// The assignment id
    assignment: String,

    /// The transfer record reference
    transfer: String,
}

impl Transit {
    fn run(self, root: &Path) -> anyhow::Result<()> {
        let registry = open_registry(root)?;
        let requirement = registry.find_by_number(self.number)?;
        let assignment_id = AssignmentId::from(self.assignment.as_str());

        let updated = registry.link_transfer(requirement.id(), &assignment_id, &self.transfer)?;

        println!(
            "{}",
            format!("Linked transfer {} to {}", self.transfer, updated.id()).success()
        );
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Receive {
    /// The requirement number
    #[clap(value_parser = parse_number)]
    number: ReqNumber,

    /// The assignment id
    assignment: String,

    /// Received quantity per product: `PRODUCT=QTY` (replaces, never adds)
    #[clap(long = "item", short, required = true, value_parser = parse_received)]
    items: Vec<ReceivedQuantity>,
}

impl Receive {
    fn run(self, root: &Path) -> anyhow::Result<()> {
        let registry = open_registry(root)?;
        let requirement = registry.find_by_number(self.number)?;
        let assignment_id = AssignmentId::from(self.assignment.as_str());

        registry.mark_received(requirement.id(), &assignment_id, self.items)?;

        let reloaded = registry.get(requirement.id())?;
        if reloaded.state() == RequirementState::Completed {
            println!(
                "{}",
                format!("{} is fully received, completed", reloaded.number()).success()
            );
        } else {
            println!(
                "{}",
                format!(
                    "Recorded receipt on {} ({}% complete)",
                    reloaded.number(),
                    reloaded.summary().percent_complete
                )
                .success()
            );
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Cancel {
    /// The requirement number
    #[clap(value_parser = parse_number)]
    number: ReqNumber,

    /// The assignment id; omit to cancel the whole requirement
    assignment: Option<String>,

    /// Why the cancellation happened
    #[clap(long)]
    reason: String,

    /// Skip confirmation prompts
    #[arg(long, short)]
    yes: bool,
}

impl Cancel {
    fn run(self, root: &Path) -> anyhow::Result<()> {
        let registry = open_registry(root)?;
        let requirement = registry.find_by_number(self.number)?;

        if let Some(assignment) = self.assignment {
            let assignment_id = AssignmentId::from(assignment.as_str());
            if !self.yes {
                confirm(&format!("Cancel assignment {assignment_id} on {}?", self.number))?;
            }
            registry.cancel_assignment(requirement.id(), &assignment_id, &self.reason)?;

            let reloaded = registry.get(requirement.id())?;
            let pending: u32 = reloaded.lines().iter().map(acopio::LineItem::pending).sum();
            println!(
                "{}",
                format!("Cancelled assignment {assignment_id} ({pending} pending again)").warning()
            );
        } else {
            if !self.yes {
                confirm(&format!("Cancel requirement {}?", self.number))?;
            }
            registry.cancel(requirement.id(), &self.reason)?;
            println!("{}", format!("Cancelled {}", self.number).warning());
        }
        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Show {
    /// The requirement number
    #[clap(value_parser = parse_number)]
    number: ReqNumber,
}

impl Show {
    fn run(self, root: &Path) -> anyhow::Result<()> {
        let registry = open_registry(root)?;
        let requirement = registry.find_by_number(self.number)?;

        print_requirement(&requirement);
        Ok(())
    }
}

fn print_requirement(requirement: &Requirement) {
    let summary = requirement.summary();

    println!("{}  {}", requirement.number(), requirement.title());
    println!(
        "state: {}   priority: {}   created: {}   {}% complete",
        requirement.state(),
        requirement.priority(),
        requirement.created_at().format("%Y-%m-%d"),
        summary.percent_complete
    );
    if let (Some(by), Some(at)) = (requirement.approved_by(), requirement.approved_at()) {
        println!("approved by {by} on {}", at.format("%Y-%m-%d"));
    }
    if !requirement.notes().is_empty() {
        println!("notes: {}", requirement.notes());
    }

    println!();
    println!(
        "{:<12} {:<14} {:>5} {:>5} {:>5} {:>5}",
        "PRODUCT", "SKU", "REQ", "ASG", "RCV", "PEND"
    );
    println!("{}", "─".repeat(52).dim());
    for line in requirement.lines() {
        let marker = if line.completed() { " ✓" } else { "" };
        println!(
            "{:<12} {:<14} {:>5} {:>5} {:>5} {:>5}{marker}",
            line.product_id(),
            line.sku(),
            line.requested(),
            line.assigned(),
            line.received(),
            line.pending()
        );
    }

    if requirement.assignments().is_empty() {
        return;
    }

    println!();
    println!("assignments ({} active parties):", summary.active_responsible_parties);
    for assignment in requirement.assignments() {
        let eta = assignment
            .estimated_arrival()
            .map_or_else(String::new, |at| format!("  eta {}", at.format("%Y-%m-%d")));
        let header = format!(
            "  {}  {} ({})  {}{eta}",
            assignment.id(),
            assignment.party().display_name,
            assignment.party().code,
            assignment.state()
        );
        if assignment.state().is_cancelled() {
            println!("{}", header.dim());
        } else {
            println!("{header}");
        }
        for line in assignment.lines() {
            println!(
                "      {} assigned {}, received {}",
                line.product_id(),
                line.assigned(),
                line.received()
            );
        }
    }
}

#[derive(Debug, clap::Parser)]
pub struct List {
    /// Only show requirements in this state
    #[arg(long)]
    state: Option<RequirementState>,

    /// Filter by regex over number and title
    #[arg(long)]
    regex: Option<String>,
}

impl List {
    fn run(self, root: &Path) -> anyhow::Result<()> {
        let registry = open_registry(root)?;
        let mut requirements = registry.list()?;

        if let Some(state) = self.state {
            requirements.retain(|requirement| requirement.state() == state);
        }
        if let Some(pattern) = &self.regex {
            let regex =
                regex::Regex::new(pattern).with_context(|| format!("invalid regex: {pattern}"))?;
            requirements.retain(|requirement| {
                let haystack = format!("{} {}", requirement.number(), requirement.title());
                regex.is_match(&haystack)
            });
        }

        if requirements.is_empty() {
            println!("No requirements found. Register one with 'acopio create'.");
            return Ok(());
        }

        let width = usize::from(terminal::terminal_width().unwrap_or(100));
        let title_width = width.saturating_sub(45).max(10);

        println!(
            "{:<14} {:<12} {:<8} {:>5}  TITLE",
            "NUMBER", "STATE", "PRIORITY", "DONE"
        );
        println!("{}", "─".repeat(width.min(100)).dim());
        for requirement in &requirements {
            let mut title = requirement.title().to_string();
            if title.chars().count() > title_width {
                title = title.chars().take(title_width.saturating_sub(1)).collect();
                title.push('…');
            }
            println!(
                "{:<14} {:<12} {:<8} {:>4}%  {title}",
                requirement.number().to_string(),
                requirement.state().to_string(),
                requirement.priority().to_string(),
                requirement.summary().percent_complete
            );
        }
        println!();
        println!("{}", format!("{} requirements", requirements.len()).dim());

        Ok(())
    }
}

#[derive(Debug, clap::Parser)]
pub struct Stats {
    /// Output format (table, json)
    #[arg(long, value_name = "FORMAT", default_value = "table")]
    output: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Table,
    Json,
}

impl Stats {
    fn run(self, root: &Path) -> anyhow::Result<()> {
        let registry = open_registry(root)?;
        let stats = Statistics::collect(registry.store())?;

        match self.output {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            }
            OutputFormat::Table => {
                if stats.total == 0 {
                    println!("No requirements found yet.");
                    return Ok(());
                }

                println!("Requirements: {}", stats.total);
                println!();
                println!("By state:");
                for (state, count) in &stats.by_state {
                    println!("  {state:<12} {count}");
                }
                println!();
                println!("By allocation:");
                for (allocation, count) in &stats.by_allocation {
                    let label = match allocation {
                        acopio::stats::Allocation::Unassigned => "unassigned",
                        acopio::stats::Allocation::PartiallyAssigned => "partial",
                        acopio::stats::Allocation::FullyAssigned => "full",
                    };
                    println!("  {label:<12} {count}");
                }
                println!();
                println!(
                    "Estimated cost: ${:.2}   Real cost: ${:.2}",
                    stats.total_estimated_cost_usd, stats.total_real_cost_usd
                );

                if !stats.parties.is_empty() {
                    println!();
                    println!("By responsible party:");
                    for (id, totals) in &stats.parties {
                        println!(
                            "  {:<20} {} requirements, {} units, ${:.2} estimated",
                            format!("{} ({id})", totals.display_name),
                            totals.requirements,
                            totals.total_assigned_quantity,
                            totals.total_estimated_cost_usd
                        );
                    }
                }
            }
        }

        Ok(())
    }
}
