use http::Method;

pub struct CachePolicy;

impl CachePolicy {
    /// Only GET responses are stored when keys include the method.
    pub fn is_cacheable(method: &Method) -> bool {
        *method == Method::GET
    }

    /// Path-scoped keys are shared by every method except HEAD, whose
    /// bodiless answer would otherwise be replayed to a later GET.
    pub fn is_path_shareable(method: &Method) -> bool {
        *method != Method::HEAD
    }
}
