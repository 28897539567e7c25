use std::fmt;

use stash_types::Fragment;

use crate::record::ResourceRecord;

/// Error reported by a fragment producer.
pub type SourceError = Box<dyn std::error::Error + Send + Sync>;

/// Iterator over the fragments a source yields.
pub type Fragments<'a> = Box<dyn Iterator<Item = Result<Fragment, SourceError>> + 'a>;

/// Pull-based producer of fragments.
///
/// Each call to [`fragments`](FragmentSource::fragments) starts a fresh pass
/// over the source. The first `Err` ends the pass as far as consumers are
/// concerned.
pub trait FragmentSource {
    fn fragments(&self) -> Fragments<'_>;
}

impl FragmentSource for Vec<Fragment> {
    fn fragments(&self) -> Fragments<'_> {
        Box::new(self.iter().cloned().map(Ok::<_, SourceError>))
    }
}

impl FragmentSource for Vec<ResourceRecord> {
    fn fragments(&self) -> Fragments<'_> {
        Box::new(
            self.iter()
                .map(|record| record.clone().into_fragment().map_err(SourceError::from)),
        )
    }
}

impl<S: FragmentSource + ?Sized> FragmentSource for &S {
    fn fragments(&self) -> Fragments<'_> {
        (**self).fragments()
    }
}

/// Adapts a closure into a [`FragmentSource`]. The closure runs once per pass.
pub struct FnSource<F>(pub F);

impl<F, I> FragmentSource for FnSource<F>
where
    F: Fn() -> I,
    I: IntoIterator<Item = Result<Fragment, SourceError>>,
    I::IntoIter: 'static,
{
    fn fragments(&self) -> Fragments<'_> {
        Box::new((self.0)().into_iter())
    }
}

impl<F> fmt::Debug for FnSource<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSource").finish_non_exhaustive()
    }
}
