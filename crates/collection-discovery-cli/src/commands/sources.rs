use collection_discovery::LoadedSources;

use super::format;

/// Print configured sources, then any configuration problems to stderr.
pub fn run(loaded: &LoadedSources) {
    format::print_sources(&loaded.sources);

    for error in &loaded.errors {
        eprintln!("warning: {error}");
    }
}
