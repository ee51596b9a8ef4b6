use std::path::PathBuf;

use thiserror::Error;

/// Problems with the files a run reads before it starts any work.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("missing {what}: {}", path.display())]
    Missing { what: &'static str, path: PathBuf },

    #[error("failed to parse {what} ({}): {message}", path.display())]
    Parse {
        what: &'static str,
        path: PathBuf,
        message: String,
    },

    #[error("failed to read {what} ({}): {source}", path.display())]
    Io {
        what: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
