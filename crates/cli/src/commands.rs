use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Run every scheduled mapping once (§6).
    Sync {
        /// Restrict the run to these mapping ids. Repeatable. Default: every
        /// mapping under `config/mappings/`.
        #[arg(long = "mapping", value_name = "ID")]
        mapping_ids: Vec<String>,

        /// Run the full extract/write path but delete artifacts instead of
        /// uploading them, and never advance a mapping's persisted watermark.
        #[arg(long)]
        dry_run: bool,

        /// Reset the named mapping(s)' watermark before running, as if they
        /// had never synced before.
        #[arg(long)]
        force: bool,

        /// Run mappings one at a time instead of concurrently.
        #[arg(long, conflicts_with = "parallel")]
        sequential: bool,

        /// Run mappings concurrently (the default). Accepted for symmetry
        /// with `--sequential`.
        #[arg(long)]
        parallel: bool,

        /// Number of mappings to run concurrently. Ignored with `--sequential`.
        #[arg(long)]
        workers: Option<usize>,

        /// Override every selected mapping's configured batch size.
        #[arg(long)]
        batch_size: Option<usize>,

        /// Print each mapping's outcome after the run completes.
        #[arg(long)]
        status: bool,
    },
    /// Print each mapping's last persisted `RunState` without running anything.
    Status {
        #[arg(long = "mapping", value_name = "ID")]
        mapping_ids: Vec<String>,

        /// Print as JSON instead of one line per mapping.
        #[arg(long)]
        json: bool,
    },
}
