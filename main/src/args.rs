use clap::Parser;
use ingestion_pipeline::CandidateSelection;

/// Ingest hosting metadata for registry packages.
#[derive(Debug, Parser)]
#[command(name = "ingest", version)]
pub struct Args {
    /// Ingest exactly this package, whatever its status
    #[arg(long, conflicts_with = "limit")]
    pub id: Option<String>,

    /// Maximum number of eligible packages to ingest
    #[arg(long, default_value_t = 1, env = "INGEST_LIMIT")]
    pub limit: usize,
}

impl Args {
    pub fn selection(&self) -> CandidateSelection {
        match &self.id {
            Some(id) => CandidateSelection::Id(id.clone()),
            None => CandidateSelection::Limit(self.limit),
        }
    }
}
