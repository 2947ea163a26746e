use std::{
    cmp::Reverse,
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use subsplit_core::{
    storage::{BillingStore, DebtInsert},
    BillingDocument, CoreError,
};
use subsplit_domain::{
    BillingMonth, Debt, DebtScope, NewDebt, NewService, NewSubscriber, NewWalletTransaction,
    Service, Subscriber, WalletTransaction,
};

const STORE_FILE: &str = "store.json";
const BACKUPS_DIR: &str = "backups";
const BACKUP_PREFIX: &str = "store";
const BACKUP_EXTENSION: &str = "json";
const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const TMP_SUFFIX: &str = "tmp";
const DEFAULT_RETENTION: usize = 5;

/// A snapshot of the store file written by [`JsonBillingStore::backup`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    /// File name inside the backups directory.
    pub id: String,
    pub created_at: Option<DateTime<Utc>>,
    pub size_bytes: u64,
    pub path: PathBuf,
}

/// Filesystem-backed [`BillingStore`] keeping one document tree per data root.
///
/// The tree is loaded once at open. Every mutation is applied to a copy,
/// written to disk through a temporary file and rename, and only then made
/// visible, so a failed write leaves both the file and memory unchanged.
#[derive(Debug)]
pub struct JsonBillingStore {
    store_path: PathBuf,
    backups_dir: PathBuf,
    retention: usize,
    document: RwLock<BillingDocument>,
}

impl JsonBillingStore {
    pub fn open(data_root: impl Into<PathBuf>) -> Result<Self, CoreError> {
        Self::with_retention(data_root, DEFAULT_RETENTION)
    }

    pub fn with_retention(
        data_root: impl Into<PathBuf>,
        retention: usize,
    ) -> Result<Self, CoreError> {
        let data_root = data_root.into();
        fs::create_dir_all(&data_root)?;
        let store_path = data_root.join(STORE_FILE);
        let document = if store_path.exists() {
            load_document(&store_path)?
        } else {
            BillingDocument::default()
        };
        debug!(
            path = %store_path.display(),
            services = document.services.len(),
            "opened billing store"
        );
        Ok(Self {
            store_path,
            backups_dir: data_root.join(BACKUPS_DIR),
            retention: retention.max(1),
            document: RwLock::new(document),
        })
    }

    pub fn store_path(&self) -> &Path {
        &self.store_path
    }

    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Copy of the in-memory document tree.
    pub async fn snapshot(&self) -> BillingDocument {
        self.document.read().await.clone()
    }

    /// Writes the current tree to a timestamped file and prunes old backups
    /// beyond the retention limit. Backups taken within the same second get
    /// a numeric suffix instead of replacing each other.
    pub async fn backup(&self, note: Option<&str>) -> Result<BackupInfo, CoreError> {
        let json = serialize_document(&*self.document.read().await)?;
        let timestamp = Utc::now().format(BACKUP_TIMESTAMP_FORMAT).to_string();
        let mut stem = format!("{BACKUP_PREFIX}_{timestamp}");
        if let Some(label) = sanitize_backup_note(note) {
            stem.push('_');
            stem.push_str(&label);
        }
        let backups_dir = self.backups_dir.clone();
        let retention = self.retention;
        let size_bytes = json.len() as u64;
        let path = run_blocking(move || {
            let path = write_new_backup(&backups_dir, &stem, &json)?;
            prune_backups(&backups_dir, retention)?;
            Ok(path)
        })
        .await?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        info!(backup = %file_name, "billing store backed up");
        Ok(BackupInfo {
            created_at: parse_backup_timestamp(&file_name),
            size_bytes,
            id: file_name,
            path,
        })
    }

    /// Backups, newest first.
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>, CoreError> {
        list_backups_in(&self.backups_dir)
    }

    /// Replaces the live tree with the contents of `backup_id`.
    pub async fn restore_backup(&self, backup_id: &str) -> Result<(), CoreError> {
        let path = self.backups_dir.join(backup_id);
        if !path.exists() {
            return Err(CoreError::StoreUnavailable(format!(
                "backup `{backup_id}` not found"
            )));
        }
        let restored = load_document(&path)?;
        let mut guard = self.document.write().await;
        self.persist(&restored).await?;
        *guard = restored;
        info!(backup = %backup_id, "billing store restored");
        Ok(())
    }

    async fn read<T>(&self, f: impl FnOnce(&BillingDocument) -> T) -> T {
        f(&*self.document.read().await)
    }

    /// Applies `f` to a copy of the tree; when it reports a change the copy
    /// is persisted and swapped in.
    async fn mutate<T, F>(&self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(&mut BillingDocument) -> Result<(T, bool), CoreError>,
    {
        let mut guard = self.document.write().await;
        let mut draft = guard.clone();
        let (value, changed) = f(&mut draft)?;
        if changed {
            self.persist(&draft).await?;
            *guard = draft;
        }
        Ok(value)
    }

    /// Serializes `document` and writes it off the async workers. Callers
    /// hold the write lock, so writes reach the disk in mutation order.
    async fn persist(&self, document: &BillingDocument) -> Result<(), CoreError> {
        let json = serialize_document(document)?;
        let path = self.store_path.clone();
        run_blocking(move || write_document_file(&path, &json)).await
    }
}

#[async_trait]
impl BillingStore for JsonBillingStore {
    async fn create_service(
        &self,
        draft: NewService,
        now: DateTime<Utc>,
    ) -> Result<Service, CoreError> {
        self.mutate(|doc| Ok((doc.create_service(draft, now), true)))
            .await
    }

    async fn get_service(&self, service_id: Uuid) -> Result<Option<Service>, CoreError> {
        Ok(self.read(|doc| doc.service(service_id).cloned()).await)
    }

    async fn list_services(&self) -> Result<Vec<Service>, CoreError> {
        Ok(self.read(BillingDocument::services).await)
    }

    async fn update_service(&self, service: &Service) -> Result<(), CoreError> {
        self.mutate(|doc| doc.update_service(service).map(|()| ((), true)))
            .await
    }

    async fn delete_service(&self, service_id: Uuid) -> Result<bool, CoreError> {
        self.mutate(|doc| {
            let removed = doc.delete_service(service_id);
            Ok((removed, removed))
        })
        .await
    }

    async fn create_subscriber(
        &self,
        service_id: Uuid,
        draft: NewSubscriber,
        now: DateTime<Utc>,
    ) -> Result<Subscriber, CoreError> {
        self.mutate(|doc| {
            doc.create_subscriber(service_id, draft, now)
                .map(|subscriber| (subscriber, true))
        })
        .await
    }

    async fn get_subscriber(
        &self,
        service_id: Uuid,
        subscriber_id: Uuid,
    ) -> Result<Option<Subscriber>, CoreError> {
        Ok(self
            .read(|doc| doc.subscriber(service_id, subscriber_id).cloned())
            .await)
    }

    async fn list_subscribers(&self, service_id: Uuid) -> Result<Vec<Subscriber>, CoreError> {
        Ok(self.read(|doc| doc.subscribers(service_id)).await)
    }

    async fn update_subscriber(
        &self,
        service_id: Uuid,
        subscriber: &Subscriber,
    ) -> Result<(), CoreError> {
        self.mutate(|doc| {
            doc.update_subscriber(service_id, subscriber)
                .map(|()| ((), true))
        })
        .await
    }

    async fn delete_subscriber(
        &self,
        service_id: Uuid,
        subscriber_id: Uuid,
    ) -> Result<bool, CoreError> {
        self.mutate(|doc| {
            let removed = doc.delete_subscriber(service_id, subscriber_id);
            Ok((removed, removed))
        })
        .await
    }

    async fn list_debts(&self, scope: &DebtScope) -> Result<Vec<Debt>, CoreError> {
        Ok(self.read(|doc| doc.debts(scope)).await)
    }

    async fn get_debt(&self, scope: &DebtScope, debt_id: Uuid) -> Result<Option<Debt>, CoreError> {
        Ok(self.read(|doc| doc.debt(scope, debt_id).cloned()).await)
    }

    async fn find_debt_by_month(
        &self,
        scope: &DebtScope,
        month: BillingMonth,
    ) -> Result<Option<Debt>, CoreError> {
        Ok(self.read(|doc| doc.debt_by_month(scope, month).cloned()).await)
    }

    async fn insert_debt_if_absent(
        &self,
        scope: &DebtScope,
        draft: NewDebt,
        now: DateTime<Utc>,
    ) -> Result<DebtInsert, CoreError> {
        self.mutate(|doc| {
            let insert = doc.insert_debt_if_absent(scope, draft, now)?;
            let created = insert.was_created();
            Ok((insert, created))
        })
        .await
    }

    async fn update_debt(&self, scope: &DebtScope, debt: &Debt) -> Result<(), CoreError> {
        self.mutate(|doc| doc.update_debt(scope, debt).map(|()| ((), true)))
            .await
    }

    async fn delete_debt(&self, scope: &DebtScope, debt_id: Uuid) -> Result<bool, CoreError> {
        self.mutate(|doc| {
            let removed = doc.delete_debt(scope, debt_id);
            Ok((removed, removed))
        })
        .await
    }

    async fn append_transaction(
        &self,
        draft: NewWalletTransaction,
    ) -> Result<WalletTransaction, CoreError> {
        self.mutate(|doc| Ok((doc.append_transaction(draft), true)))
            .await
    }

    async fn list_transactions(&self) -> Result<Vec<WalletTransaction>, CoreError> {
        Ok(self.read(|doc| doc.transactions.clone()).await)
    }

    async fn list_transactions_for_debt(
        &self,
        debt_id: Uuid,
    ) -> Result<Vec<WalletTransaction>, CoreError> {
        Ok(self.read(|doc| doc.transactions_for_debt(debt_id)).await)
    }
}

/// Loads a document tree from an arbitrary path.
pub fn load_document(path: &Path) -> Result<BillingDocument, CoreError> {
    let data = fs::read_to_string(path)?;
    serde_json::from_str(&data).map_err(|err| CoreError::Serde(err.to_string()))
}

/// Writes a document tree to `path` through a temporary sibling file.
pub fn save_document(document: &BillingDocument, path: &Path) -> Result<(), CoreError> {
    write_document_file(path, &serialize_document(document)?)
}

fn write_document_file(path: &Path, json: &str) -> Result<(), CoreError> {
    let tmp = tmp_path(path);
    write_atomic(&tmp, json)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

async fn run_blocking<T, F>(task: F) -> Result<T, CoreError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, CoreError> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|err| CoreError::StoreUnavailable(format!("store writer stopped: {err}")))?
}

/// Backups found in `dir`, newest first.
fn list_backups_in(dir: &Path) -> Result<Vec<BackupInfo>, CoreError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(BACKUP_EXTENSION) {
            continue;
        }
        if let Some(file_name) = path.file_name().and_then(|name| name.to_str()) {
            let size_bytes = fs::metadata(&path).map(|meta| meta.len()).unwrap_or(0);
            entries.push(BackupInfo {
                id: file_name.to_string(),
                created_at: parse_backup_timestamp(file_name),
                size_bytes,
                path: path.clone(),
            });
        }
    }
    entries.sort_by(|a, b| {
        Reverse(a.created_at)
            .cmp(&Reverse(b.created_at))
            .then_with(|| b.id.cmp(&a.id))
    });
    Ok(entries)
}

fn prune_backups(dir: &Path, retention: usize) -> Result<(), CoreError> {
    for entry in list_backups_in(dir)?.into_iter().skip(retention) {
        let _ = fs::remove_file(entry.path);
    }
    Ok(())
}

/// Creates `<stem>.json`, or `<stem>_2.json` and up when the name is taken.
fn write_new_backup(dir: &Path, stem: &str, json: &str) -> Result<PathBuf, CoreError> {
    fs::create_dir_all(dir)?;
    let mut copy = 1;
    loop {
        let file_name = if copy == 1 {
            format!("{stem}.{BACKUP_EXTENSION}")
        } else {
            format!("{stem}_{copy}.{BACKUP_EXTENSION}")
        };
        let path = dir.join(file_name);
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(json.as_bytes())?;
                file.sync_all()?;
                return Ok(path);
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => copy += 1,
            Err(err) => return Err(err.into()),
        }
    }
}

fn sanitize_backup_note(note: Option<&str>) -> Option<String> {
    let raw = note?.trim();
    let mut sanitized = String::new();
    let mut last_dash = false;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            sanitized.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !sanitized.is_empty() && !last_dash {
            sanitized.push('-');
            last_dash = true;
        }
    }
    let trimmed = sanitized.trim_matches('-');
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Reads the timestamp out of `store_<date>_<time>[_<note>].json`.
fn parse_backup_timestamp(name: &str) -> Option<DateTime<Utc>> {
    let stem = name.strip_suffix(&format!(".{BACKUP_EXTENSION}"))?;
    let mut segments = stem.strip_prefix(&format!("{BACKUP_PREFIX}_"))?.split('_');
    let date = segments.next()?;
    let time = segments.next()?;
    if !is_digits(date, 8) || !is_digits(time, 6) {
        return None;
    }
    NaiveDateTime::parse_from_str(&format!("{date}{time}"), "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| DateTime::from_naive_utc_and_offset(naive, Utc))
}

fn is_digits(value: &str, len: usize) -> bool {
    value.len() == len && value.chars().all(|c| c.is_ascii_digit())
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut tmp = path.to_path_buf();
    let ext = match path.extension().and_then(|ext| ext.to_str()) {
        Some(existing) => format!("{existing}.{TMP_SUFFIX}"),
        None => TMP_SUFFIX.to_string(),
    };
    tmp.set_extension(ext);
    tmp
}

fn write_atomic(path: &Path, data: &str) -> Result<(), CoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = File::create(path)?;
    file.write_all(data.as_bytes())?;
    file.sync_all()?;
    Ok(())
}

fn serialize_document(document: &BillingDocument) -> Result<String, CoreError> {
    serde_json::to_string_pretty(document).map_err(|err| CoreError::Serde(err.to_string()))
}
