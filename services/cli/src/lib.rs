mod cli;
mod commands;
mod infra;

use decree_engine::error::AppError;

pub fn run() -> Result<(), AppError> {
    cli::run()
}
