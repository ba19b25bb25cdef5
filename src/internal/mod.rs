//! Internal implementation details.

pub(crate) mod loading;

pub(crate) use loading::LoadingGuard;
