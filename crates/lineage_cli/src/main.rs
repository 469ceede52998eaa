//! Lineage command-line tool.
//!
//! # Responsibility
//! - Manage the member store (import, parent assignment, removal).
//! - Render the lineage tree, org chart and leaderboard as plain text
//!   through the same view state the UI uses.

use anyhow::Context;
use clap::{Parser, Subcommand};
use lineage_core::db::open_db;
use lineage_core::{
    default_log_level, field_value, init_logging, LeaderPageRequest, LeaderService,
    LeaderboardState, LineageNode, LineageQuery, LineageService, MemberService, NewMember,
    OrgChartOptions, OrgChartState, SqliteMemberRepository, TierStyle, TreeViewState,
    DEFAULT_LEADER_LIMIT,
};
use log::{info, warn};
use rusqlite::Connection;
use std::borrow::Cow;
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Parser)]
#[command(name = "lineage")]
#[command(about = "Manage and inspect the spiritual lineage member store")]
struct Cli {
    /// SQLite member store
    #[arg(long, env = "LINEAGE_DB_PATH", default_value = "lineage.sqlite3")]
    db: PathBuf,

    /// Rolling log directory; file logging is off when absent
    #[arg(long, env = "LINEAGE_LOG_DIR")]
    log_dir: Option<PathBuf>,

    #[arg(long, env = "LINEAGE_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
    /// Import members from a JSON array file
    Import { file: PathBuf },
    /// Set or clear a member's spiritual parent
    Assign {
        id: String,
        #[arg(long)]
        parent: Option<String>,
    },
    /// Soft-delete a member; their children become roots
    Remove { id: String },
    /// Print the indented lineage tree
    Tree {
        #[arg(long)]
        root: Option<String>,
        #[arg(long)]
        max_depth: Option<u32>,
        #[arg(long)]
        search: Option<String>,
    },
    /// Print the org chart of one member
    OrgChart {
        #[arg(long)]
        root: String,
        #[arg(long)]
        expand_all: bool,
    },
    /// Print population and leader counts
    Stats,
    /// Print the leaderboard up to the given page
    Leaders {
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = DEFAULT_LEADER_LIMIT)]
        limit: u32,
        #[arg(long)]
        search: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(log_dir) = &cli.log_dir {
        let log_dir = std::env::current_dir()?.join(log_dir);
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        if let Err(err) = init_logging("lineage", level, &log_dir) {
            eprintln!("logging disabled: {err}");
        }
    }

    let conn = open_db(&cli.db)
        .with_context(|| format!("failed to open member store {}", cli.db.display()))?;
    let command_name = cli.command.name();
    let started_at = Instant::now();
    let result = run(&conn, cli.command);
    match &result {
        Ok(_) => info!(
            "event=cli_command module=cli command={command_name} status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => warn!(
            "event=cli_command module=cli command={command_name} status=error duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            field_value(&err.to_string())
        ),
    }
    print!("{}", result?);
    Ok(())
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Self::Import { .. } => "import",
            Self::Assign { .. } => "assign",
            Self::Remove { .. } => "remove",
            Self::Tree { .. } => "tree",
            Self::OrgChart { .. } => "org_chart",
            Self::Stats => "stats",
            Self::Leaders { .. } => "leaders",
        }
    }
}

fn run(conn: &Connection, command: Command) -> anyhow::Result<String> {
    let repo = SqliteMemberRepository::try_new(conn)?;
    match command {
        Command::Import { file } => {
            let content = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            import(MemberService::new(repo), &content)
        }
        Command::Assign { id, parent } => {
            MemberService::new(repo).assign_spiritual_parent(&id, parent.as_deref())?;
            info!(
                "event=cli_assign module=cli status=ok member_id={} parent_id={}",
                field_value(&id),
                parent.as_deref().map_or(Cow::Borrowed("none"), field_value)
            );
            Ok(match parent {
                Some(parent) => format!("{id} -> {parent}\n"),
                None => format!("{id} is now a root\n"),
            })
        }
        Command::Remove { id } => {
            MemberService::new(repo).remove_member(&id)?;
            info!("event=cli_remove module=cli status=ok member_id={}", field_value(&id));
            Ok(format!("removed {id}\n"))
        }
        Command::Tree {
            root,
            max_depth,
            search,
        } => {
            let query = LineageQuery {
                root_id: root,
                max_depth,
            };
            render_tree(&LineageService::new(repo), &query, search.as_deref().unwrap_or(""))
        }
        Command::OrgChart { root, expand_all } => {
            let tree = LineageService::new(repo).lineage_tree(&LineageQuery::for_root(root))?;
            let Some(root) = tree.family_tree.first() else {
                return Ok(String::new());
            };
            let mut chart = OrgChartState::new(root);
            if expand_all {
                chart.expand_all(root);
            }
            Ok(chart.layout(root, &OrgChartOptions::default()).render_text())
        }
        Command::Stats => {
            let stats = LeaderService::new(repo).population_statistics()?;
            Ok(format!(
                "members={} roots={} with_parent={} leaders={} max_depth={}\n",
                stats.total_members,
                stats.root_members,
                stats.members_with_spiritual_parents,
                stats.total_leaders,
                stats.max_depth
            ))
        }
        Command::Leaders {
            page,
            limit,
            search,
        } => render_leaders(
            &LeaderService::new(repo),
            page,
            limit,
            search.as_deref().unwrap_or(""),
        ),
    }
}

fn import(
    service: MemberService<SqliteMemberRepository<'_>>,
    content: &str,
) -> anyhow::Result<String> {
    let rows: Vec<NewMember> =
        serde_json::from_str(content).context("import file must be a JSON array of members")?;
    let report = service.import_members(rows)?;
    info!(
        "event=cli_import module=cli status=ok created={} linked={} rejected={}",
        report.created.len(),
        report.linked,
        report.rejected.len()
    );

    let mut output = format!(
        "created={} linked={} rejected={}\n",
        report.created.len(),
        report.linked,
        report.rejected.len()
    );
    for rejection in &report.rejected {
        output.push_str(&format!(
            "  row {} ({}): {}\n",
            rejection.row,
            rejection.id.as_deref().unwrap_or("-"),
            rejection.reason
        ));
    }
    Ok(output)
}

fn render_tree(
    service: &LineageService<SqliteMemberRepository<'_>>,
    query: &LineageQuery,
    search: &str,
) -> anyhow::Result<String> {
    let tree = service.lineage_tree(query)?;
    let mut output = String::new();
    for cycle in &tree.cycles {
        output.push_str(&format!(
            "warning: lineage of {} loops back to {}\n",
            cycle.member_id, cycle.ancestor_id
        ));
    }

    // Non-interactive output shows every branch.
    let mut ids = HashSet::new();
    collect_ids(&tree.family_tree, &mut ids);
    let state = TreeViewState::new(&tree.family_tree, ids);

    for row in state.visible_rows(&tree.family_tree, search) {
        let marker = match (row.has_children, row.truncated) {
            (_, true) => "+",
            (true, _) => "-",
            (false, _) => " ",
        };
        output.push_str(&format!(
            "{}{marker} {} [{}] children={}\n",
            "  ".repeat(row.depth),
            row.full_name,
            row.id,
            row.child_count
        ));
    }

    let stats = tree.statistics;
    output.push_str(&format!(
        "members={} roots={} with_parent={} max_depth={}\n",
        stats.total_members,
        stats.root_members,
        stats.members_with_spiritual_parents,
        stats.max_depth
    ));
    Ok(output)
}

fn collect_ids(nodes: &[LineageNode], out: &mut HashSet<String>) {
    for node in nodes {
        if out.insert(node.id.clone()) {
            collect_ids(&node.spiritual_children, out);
        }
    }
}

fn render_leaders(
    service: &LeaderService<SqliteMemberRepository<'_>>,
    page: u32,
    limit: u32,
    search: &str,
) -> anyhow::Result<String> {
    let mut board = LeaderboardState::new();
    for current in 1..=page.max(1) {
        let request = LeaderPageRequest::new(i64::from(current), i64::from(limit));
        board.apply_page(service.leaders(&request)?);
        if !board.has_more() {
            break;
        }
    }
    board.set_query(search);

    let mut output = String::new();
    for (rank, leader) in board.visible().into_iter().enumerate() {
        let style = TierStyle::for_leader(leader);
        output.push_str(&format!(
            "{:>3}. {} [{}] {} direct={} downlines={} ({})\n",
            rank + 1,
            leader.full_name,
            leader.id,
            leader.church,
            leader.direct_children,
            leader.total_downlines,
            style.badge
        ));
    }
    if let Some(stats) = board.statistics() {
        output.push_str(&format!(
            "leaders={} members={} max_depth={} more={}\n",
            stats.total_leaders,
            stats.total_members,
            stats.max_depth,
            board.has_more()
        ));
    }
    Ok(output)
}
