mod audit;
mod comments;
pub mod governance;
