pub mod rebase;

pub use rebase::RebaseCommand;
