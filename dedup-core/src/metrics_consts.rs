pub const PIPELINE_RUNS: &str = "dedup_pipeline_runs_total";
pub const PIPELINE_DURATION: &str = "dedup_pipeline_duration_seconds";
pub const CANDIDATES_EXTRACTED: &str = "dedup_candidates_extracted_total";
pub const DUPLICATES_FOUND: &str = "dedup_duplicates_found_total";
pub const LOOKUP_BATCHES: &str = "dedup_lookup_batches_total";
pub const LOOKUP_BATCH_TIME: &str = "dedup_lookup_batch_duration_seconds";
pub const WRITE_BATCHES: &str = "dedup_write_batches_total";
pub const WRITE_BATCH_TIME: &str = "dedup_write_batch_duration_seconds";
pub const IDENTIFIERS_WRITTEN: &str = "dedup_identifiers_written_total";
pub const STORE_RETRIES: &str = "dedup_store_retries_total";
pub const OUTPUT_FILES_WRITTEN: &str = "dedup_output_files_written_total";
