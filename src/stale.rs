//!
//! Timestamp-based staleness of pipeline targets
//!
//! A target is fresh iff it exists and is not older than any of its
//! dependencies that exist. Missing dependencies are skipped so that
//! optional upstream artifacts do not force recomputation.
//!
use log::debug;
use std::path::Path;
use std::time::SystemTime;

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

///
/// Does `target` need to be recomputed?
///
/// Only reads file metadata.
///
pub fn is_stale<P, Q>(target: P, deps: &[Q]) -> bool
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    let target = target.as_ref();
    let t_target = match modified(target) {
        Some(t) => t,
        None => {
            debug!("{} is stale: target missing", target.display());
            return true;
        }
    };
    for dep in deps {
        let dep = dep.as_ref();
        match modified(dep) {
            Some(t_dep) if t_dep > t_target => {
                debug!(
                    "{} is stale: dependency {} is newer",
                    target.display(),
                    dep.display()
                );
                return true;
            }
            Some(_) => {}
            None => debug!("{}: skipping missing dependency {}", target.display(), dep.display()),
        }
    }
    debug!("{} is up to date", target.display());
    false
}

///
/// `is_stale` for a job owning several targets: stale if any of them is.
///
pub fn any_stale<P, Q>(targets: &[P], deps: &[Q]) -> bool
where
    P: AsRef<Path>,
    Q: AsRef<Path>,
{
    targets.is_empty() || targets.iter().any(|target| is_stale(target, deps))
}
