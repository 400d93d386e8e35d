pub mod error;
pub mod state;

pub use lasso;

lazy_static::lazy_static! {
    /// Process-wide string interner backing [`state::InternedId`].
    pub static ref INTERN: lasso::ThreadedRodeo = lasso::ThreadedRodeo::new();
}
