use std::path::PathBuf;

#[tokio::main]
async fn main() -> Result<(), focus_clock::InfraError> {
    let workspace_root = match std::env::args_os().nth(1) {
        Some(path) => PathBuf::from(path),
        None => std::env::current_dir()?,
    };
    focus_clock::run(workspace_root).await
}
