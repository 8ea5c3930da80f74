// src/git.rs

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use git2::{BranchType, Commit, Delta, DiffOptions, ObjectType, Oid, Repository, Sort};
use tracing::{debug, trace};

use crate::model::{
    ChangeStatus, HistoryItem, HistoryItemChange, HistoryItemId, HistoryItemRef, HistoryItemRefId,
    HistoryItemStatistics,
};
use crate::provider::{HistoryItemsOptions, HistoryProvider, PrivilegedRefs};

pub const PROVIDER_ID: &str = "git";

const BRANCHES: &str = "branches";
const REMOTE_BRANCHES: &str = "remote branches";
const TAGS: &str = "tags";

/// History of a local git repository.
///
/// git2 handles are not `Sync`, so every call opens the repository on a
/// blocking thread.
pub struct GitHistoryProvider {
    path: PathBuf,
    /// HEAD, its upstream and the base ref as of `open`
    privileged: PrivilegedRefs,
}

impl GitHistoryProvider {
    pub fn open(path: &Path) -> Result<Self, git2::Error> {
        let repo = Repository::discover(path)?;
        let path = repo
            .workdir()
            .unwrap_or_else(|| repo.path())
            .to_path_buf();
        let privileged = read_privileged_refs(&repo)?;
        debug!(path = %path.display(), ?privileged, "opened git repository");
        Ok(Self { path, privileged })
    }

    pub fn root(&self) -> &Path {
        &self.path
    }

    async fn with_repo<T, F>(&self, f: F) -> anyhow::Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Repository) -> anyhow::Result<T> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let repo = Repository::open(&path)?;
            f(&repo)
        })
        .await
        .context("git worker panicked")?
    }
}

#[async_trait]
impl HistoryProvider for GitHistoryProvider {
    async fn provide_history_items(
        &self,
        options: HistoryItemsOptions,
    ) -> anyhow::Result<Option<Vec<HistoryItem>>> {
        self.with_repo(move |repo| history_items(repo, &options).map(Some))
            .await
    }

    async fn provide_history_item_refs(
        &self,
        filter: Option<&[HistoryItemRefId]>,
    ) -> anyhow::Result<Option<Vec<HistoryItemRef>>> {
        let filter: Option<Vec<HistoryItemRefId>> = filter.map(<[_]>::to_vec);
        self.with_repo(move |repo| {
            let refs = all_refs(repo)?
                .into_iter()
                .filter(|r| filter.as_ref().map_or(true, |ids| ids.contains(&r.id)))
                .collect();
            Ok(Some(refs))
        })
        .await
    }

    async fn provide_history_item_changes(
        &self,
        history_item_id: &str,
        parent_id: Option<&str>,
    ) -> anyhow::Result<Option<Vec<HistoryItemChange>>> {
        let id = history_item_id.to_string();
        let parent = parent_id.map(String::from);
        self.with_repo(move |repo| changes(repo, &id, parent.as_deref()).map(Some))
            .await
    }

    async fn resolve_history_item_refs_common_ancestor(
        &self,
        ref_ids: &[HistoryItemRefId],
    ) -> anyhow::Result<Option<HistoryItemId>> {
        let ref_ids = ref_ids.to_vec();
        self.with_repo(move |repo| {
            if ref_ids.len() < 2 {
                return Ok(None);
            }
            let oids = ref_ids
                .iter()
                .map(|id| resolve_commit(repo, id))
                .collect::<anyhow::Result<Vec<Oid>>>()?;
            match repo.merge_base_many(&oids) {
                Ok(oid) => Ok(Some(oid.to_string())),
                Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(None),
                Err(err) => Err(err.into()),
            }
        })
        .await
    }

    fn current_history_item_ref(&self) -> Option<HistoryItemRef> {
        self.privileged.current.clone()
    }

    fn current_history_item_remote_ref(&self) -> Option<HistoryItemRef> {
        self.privileged.remote.clone()
    }

    fn current_history_item_base_ref(&self) -> Option<HistoryItemRef> {
        self.privileged.base.clone()
    }
}

fn category_of(full_name: &str) -> Option<&'static str> {
    if full_name.starts_with("refs/heads/") {
        Some(BRANCHES)
    } else if full_name.starts_with("refs/remotes/") {
        Some(REMOTE_BRANCHES)
    } else if full_name.starts_with("refs/tags/") {
        Some(TAGS)
    } else {
        None
    }
}

fn to_ref(reference: &git2::Reference<'_>) -> Option<HistoryItemRef> {
    let full_name = reference.name()?;
    let category = category_of(full_name)?;
    // remote HEAD is an alias of another remote branch
    if category == REMOTE_BRANCHES && full_name.ends_with("/HEAD") {
        return None;
    }
    let target = reference.peel(ObjectType::Commit).ok()?.id();
    Some(
        HistoryItemRef::new(full_name, reference.shorthand().unwrap_or(full_name))
            .with_revision(target.to_string())
            .with_category(category),
    )
}

fn all_refs(repo: &Repository) -> anyhow::Result<Vec<HistoryItemRef>> {
    let mut refs = Vec::new();
    for reference in repo.references()? {
        if let Some(r) = to_ref(&reference?) {
            refs.push(r);
        }
    }
    Ok(refs)
}

fn read_privileged_refs(repo: &Repository) -> Result<PrivilegedRefs, git2::Error> {
    let head = match repo.head() {
        Ok(head) => head,
        // unborn branch
        Err(err) if err.code() == git2::ErrorCode::UnbornBranch => return Ok(PrivilegedRefs::default()),
        Err(err) => return Err(err),
    };

    let current = if head.is_branch() {
        to_ref(&head)
    } else {
        let oid = head.peel_to_commit()?.id();
        let short = oid.to_string()[..7].to_string();
        Some(HistoryItemRef::new("HEAD", short).with_revision(oid.to_string()))
    };

    let mut remote = None;
    let mut base = None;
    if let Some(branch_name) = head.is_branch().then(|| head.shorthand()).flatten() {
        if let Ok(branch) = repo.find_branch(branch_name, BranchType::Local) {
            if let Ok(upstream) = branch.upstream() {
                let upstream_ref = upstream.into_reference();
                remote = to_ref(&upstream_ref);

                // the remote's default branch serves as the base
                let remote_name = upstream_ref
                    .shorthand()
                    .and_then(|name| name.split('/').next())
                    .map(String::from);
                if let Some(remote_name) = remote_name {
                    base = repo
                        .find_reference(&format!("refs/remotes/{remote_name}/HEAD"))
                        .ok()
                        .and_then(|alias| alias.resolve().ok())
                        .and_then(|resolved| to_ref(&resolved))
                        .filter(|candidate| Some(&candidate.id) != remote.as_ref().map(|r| &r.id));
                }
            }
        }
    }

    Ok(PrivilegedRefs { current, remote, base })
}

fn resolve_commit(repo: &Repository, ref_id: &str) -> anyhow::Result<Oid> {
    let object = repo
        .revparse_single(ref_id)
        .with_context(|| format!("unknown reference {ref_id}"))?;
    Ok(object.peel(ObjectType::Commit)?.id())
}

fn history_items(repo: &Repository, options: &HistoryItemsOptions) -> anyhow::Result<Vec<HistoryItem>> {
    if options.history_item_refs.is_empty() {
        return Ok(Vec::new());
    }

    let mut revwalk = repo.revwalk()?;
    revwalk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
    for ref_id in &options.history_item_refs {
        revwalk.push(resolve_commit(repo, ref_id)?)?;
    }

    let mut refs_by_commit: HashMap<String, Vec<HistoryItemRef>> = HashMap::new();
    for r in all_refs(repo)? {
        if let Some(revision) = r.revision.clone() {
            refs_by_commit.entry(revision).or_default().push(r);
        }
    }

    let mut items = Vec::with_capacity(options.limit);
    for oid in revwalk.skip(options.skip).take(options.limit) {
        let commit = repo.find_commit(oid?)?;
        items.push(to_history_item(&commit, &mut refs_by_commit));
    }
    trace!(skip = options.skip, limit = options.limit, returned = items.len(), "walked history");
    Ok(items)
}

fn to_history_item(commit: &Commit<'_>, refs_by_commit: &mut HashMap<String, Vec<HistoryItemRef>>) -> HistoryItem {
    let id = commit.id().to_string();
    let author = commit.author();
    let references = refs_by_commit.remove(&id).unwrap_or_default();

    HistoryItem {
        parent_ids: commit.parent_ids().map(|p| p.to_string()).collect(),
        subject: commit.summary().unwrap_or_default().to_string(),
        author: author.name().map(String::from),
        timestamp: Some(commit.time().seconds() * 1000),
        display_id: Some(id[..7.min(id.len())].to_string()),
        references,
        statistics: None,
        id,
    }
}

fn changes(repo: &Repository, id: &str, parent_id: Option<&str>) -> anyhow::Result<Vec<HistoryItemChange>> {
    let commit = repo.find_commit(Oid::from_str(id)?)?;
    let parent_tree = match parent_id {
        Some(parent_id) => Some(repo.find_commit(Oid::from_str(parent_id)?)?.tree()?),
        None => None,
    };
    let current_tree = commit.tree()?;

    let mut diff_opts = DiffOptions::new();
    diff_opts.include_untracked(false);
    diff_opts.ignore_filemode(true);

    let mut diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&current_tree), Some(&mut diff_opts))?;
    diff.find_similar(None)?;

    let mut changes = Vec::new();
    for delta in diff.deltas() {
        let status = match delta.status() {
            Delta::Added => ChangeStatus::Added,
            Delta::Deleted => ChangeStatus::Deleted,
            Delta::Renamed => ChangeStatus::Renamed,
            Delta::Copied => ChangeStatus::Copied,
            Delta::Typechange => ChangeStatus::TypeChanged,
            Delta::Modified => ChangeStatus::Modified,
            _ => continue,
        };
        let new_path = delta.new_file().path().and_then(|p| p.to_str()).map(String::from);
        let old_path = delta.old_file().path().and_then(|p| p.to_str()).map(String::from);
        let Some(path) = new_path.clone().or_else(|| old_path.clone()) else {
            continue;
        };
        changes.push(HistoryItemChange {
            path,
            original_path: old_path.filter(|old| Some(old) != new_path.as_ref()),
            status,
        });
    }
    Ok(changes)
}

impl GitHistoryProvider {
    /// Diff statistics of a history item against its first parent
    pub fn statistics(&self, id: &str) -> anyhow::Result<HistoryItemStatistics> {
        let repo = Repository::open(&self.path)?;
        let commit = repo.find_commit(Oid::from_str(id)?)?;
        let parent_tree = commit.parents().next().map(|p| p.tree()).transpose()?;
        let diff = repo.diff_tree_to_tree(parent_tree.as_ref(), Some(&commit.tree()?), None)?;
        let stats = diff.stats()?;
        Ok(HistoryItemStatistics {
            files: stats.files_changed(),
            insertions: stats.insertions(),
            deletions: stats.deletions(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn commit_file(repo: &Repository, path: &str, content: &str, message: &str) -> Oid {
        let workdir = repo.workdir().unwrap();
        let full = workdir.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(&full, content).unwrap();

        let mut index = repo.index().unwrap();
        index.add_path(Path::new(path)).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        let sig = git2::Signature::now("Test", "test@example.com").unwrap();
        let parents: Vec<Commit<'_>> = repo
            .head()
            .ok()
            .and_then(|h| h.peel_to_commit().ok())
            .into_iter()
            .collect();
        let parent_refs: Vec<&Commit<'_>> = parents.iter().collect();
        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parent_refs).unwrap()
    }

    #[tokio::test]
    async fn pages_through_local_history() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let first = commit_file(&repo, "a.txt", "1", "first");
        commit_file(&repo, "src/b.txt", "2", "second");
        let third = commit_file(&repo, "a.txt", "3", "third");

        let provider = GitHistoryProvider::open(dir.path()).unwrap();
        let current = provider.current_history_item_ref().unwrap();
        assert_eq!(current.revision, Some(third.to_string()));
        assert_eq!(current.category.as_deref(), Some(BRANCHES));

        let page = |skip| HistoryItemsOptions {
            history_item_refs: vec![current.id.clone()],
            limit: 2,
            skip,
        };
        let first_page = provider.provide_history_items(page(0)).await.unwrap().unwrap();
        let subjects: Vec<&str> = first_page.iter().map(|i| i.subject.as_str()).collect();
        assert_eq!(subjects, vec!["third", "second"]);
        assert_eq!(first_page[0].references[0].id, current.id);

        let second_page = provider.provide_history_items(page(2)).await.unwrap().unwrap();
        assert_eq!(second_page.len(), 1);
        assert_eq!(second_page[0].id, first.to_string());
        assert!(second_page[0].parent_ids.is_empty());
    }

    #[test]
    fn privileged_refs_are_read_at_open() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let first = commit_file(&repo, "a.txt", "1", "first");

        let provider = GitHistoryProvider::open(dir.path()).unwrap();
        let second = commit_file(&repo, "a.txt", "2", "second");
        assert_eq!(provider.current_history_item_ref().unwrap().revision, Some(first.to_string()));

        let reopened = GitHistoryProvider::open(dir.path()).unwrap();
        assert_eq!(reopened.current_history_item_ref().unwrap().revision, Some(second.to_string()));
        assert!(reopened.current_history_item_remote_ref().is_none());
    }

    #[tokio::test]
    async fn changes_against_first_parent() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::init(dir.path()).unwrap();
        let first = commit_file(&repo, "a.txt", "1", "first");
        let second = commit_file(&repo, "src/b.txt", "2", "second");

        let provider = GitHistoryProvider::open(dir.path()).unwrap();
        let changes = provider
            .provide_history_item_changes(&second.to_string(), Some(&first.to_string()))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(changes, vec![HistoryItemChange::new("src/b.txt", ChangeStatus::Added)]);

        let stats = provider.statistics(&second.to_string()).unwrap();
        assert_eq!((stats.files, stats.insertions, stats.deletions), (1, 1, 0));
    }
}
