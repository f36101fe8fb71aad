use crate::{ExportFormat, OutputMode, emit_success};
use daybook::config::{DaybookConfig, ensure_dir, load_config, write_config};
use daybook::diary::RECORDS_STORE;
use daybook::output::is_quiet;
use daybook::ui::{self, Icons};
use daybook::{DeleteOutcome, Diary, Entry, ImportOptions, Key};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};

fn config_or_default(path: &Path) -> anyhow::Result<DaybookConfig> {
    Ok(load_config(Some(path))?.unwrap_or_default())
}

async fn open_diary(path: &Path) -> anyhow::Result<Diary> {
    let config = config_or_default(path)?;
    Ok(Diary::open(&config).await?)
}

fn resolve_date(date: Option<String>) -> anyhow::Result<String> {
    match date {
        Some(date) => {
            chrono::NaiveDate::parse_from_str(&date, "%Y-%m-%d")
                .map_err(|e| anyhow::anyhow!("invalid date '{}' (expected YYYY-MM-DD): {}", date, e))?;
            Ok(date)
        }
        None => Ok(chrono::Local::now().format("%Y-%m-%d").to_string()),
    }
}

async fn fetch_entry(diary: &Diary, uid: i64) -> anyhow::Result<(daybook::Record, Entry)> {
    let Some(record) = diary.get_record(&Key::Integer(uid)).await? else {
        anyhow::bail!("no record with uid {}", uid);
    };
    let entry = Entry::from_record(&record)?;
    Ok((record, entry))
}

pub fn run_init(path: &Path, force: bool, output_mode: OutputMode) -> anyhow::Result<()> {
    let config = DaybookConfig::default();
    write_config(path, &config, force)?;
    ensure_dir(&config.data_dir)?;
    ensure_dir(&config.export_dir)?;

    if output_mode.is_human() {
        ui::success(&format!("Wrote {}", path.display()));
        ui::summary_row("database:", &config.database_path().display().to_string());
        ui::summary_row("exports: ", &config.export_dir.display().to_string());
    } else {
        emit_success(output_mode, "init", json!({ "config": path, "settings": config }))?;
    }
    Ok(())
}

pub async fn run_add(
    path: &Path,
    date: Option<String>,
    index: Option<i64>,
    title: Option<String>,
    body: Option<String>,
    output_mode: OutputMode,
) -> anyhow::Result<()> {
    let diary = open_diary(path).await?;
    let date = resolve_date(date)?;

    let index = match index {
        Some(index) => index,
        None => {
            let existing = diary.list_records_by_date(&date).await?;
            existing
                .iter()
                .filter_map(|r| r.get("index").and_then(Value::as_i64))
                .max()
                .map_or(0, |max| max + 1)
        }
    };

    let key = diary.add_record(&date, index).await?;
    if title.is_some() || body.is_some() {
        let Some(mut record) = diary.get_record(&key).await? else {
            anyhow::bail!("record {} vanished after insert", key);
        };
        if let Some(title) = title {
            record.insert("title".into(), Value::String(title));
        }
        if let Some(body) = body {
            record.insert("content".into(), Value::String(body));
        }
        diary.update_record(record).await?;
    }

    if output_mode.is_human() {
        ui::record_new(&key.to_string(), &date);
    } else {
        emit_success(output_mode, "add", json!({ "uid": key, "date": date, "index": index }))?;
    }
    Ok(())
}

pub async fn run_list(path: &Path, date: Option<String>, output_mode: OutputMode) -> anyhow::Result<()> {
    let diary = open_diary(path).await?;
    let date = resolve_date(date)?;
    let records = diary.list_records_by_date(&date).await?;

    if output_mode.is_human() {
        if !is_quiet() {
            ui::header(&format!("{} {}", Icons::CALENDAR, date));
        }
        if records.is_empty() {
            println!("{}", ui::muted("No records."));
            return Ok(());
        }
        let entries = records.iter().map(Entry::from_record).collect::<daybook::Result<Vec<_>>>()?;
        println!("{}", ui::entries_table(&entries));
    } else {
        emit_success(output_mode, "list", json!({ "date": date, "records": records }))?;
    }
    Ok(())
}

pub async fn run_show(path: &Path, uid: i64, output_mode: OutputMode) -> anyhow::Result<()> {
    let diary = open_diary(path).await?;
    let (record, entry) = fetch_entry(&diary, uid).await?;

    if output_mode.is_human() {
        let title = if entry.title.is_empty() { "(untitled)" } else { entry.title.as_str() };
        ui::header(title);
        ui::summary_row("uid:  ", &uid.to_string());
        ui::summary_row("date: ", &entry.date);
        ui::summary_row("index:", &entry.index.to_string());
        if !entry.content.is_empty() {
            println!();
            println!("{}", entry.content);
        }
    } else {
        emit_success(output_mode, "show", Value::Object(record))?;
    }
    Ok(())
}

pub async fn run_edit(
    path: &Path,
    uid: i64,
    title: Option<String>,
    body: Option<String>,
    output_mode: OutputMode,
) -> anyhow::Result<()> {
    if title.is_none() && body.is_none() {
        anyhow::bail!("nothing to change (pass --title and/or --body)");
    }

    let diary = open_diary(path).await?;
    let (mut record, _) = fetch_entry(&diary, uid).await?;
    if let Some(title) = title {
        record.insert("title".into(), Value::String(title));
    }
    if let Some(body) = body {
        record.insert("content".into(), Value::String(body));
    }
    let key = diary.update_record(record.clone()).await?;

    if output_mode.is_human() {
        ui::record_modified(&key.to_string());
    } else {
        emit_success(output_mode, "edit", Value::Object(record))?;
    }
    Ok(())
}

pub async fn run_delete(path: &Path, uid: i64, output_mode: OutputMode) -> anyhow::Result<()> {
    let diary = open_diary(path).await?;
    let key = Key::Integer(uid);
    let existed = diary.get_record(&key).await?.is_some();
    diary.delete_record(&key).await?;

    if output_mode.is_human() {
        if existed {
            ui::record_deleted(&key.to_string());
        } else {
            ui::warn(&format!("No record with uid {}", uid));
        }
    } else {
        emit_success(output_mode, "delete", json!({ "uid": uid, "existed": existed }))?;
    }
    Ok(())
}

pub async fn run_export(
    path: &Path,
    format: ExportFormat,
    out: Option<PathBuf>,
    output_mode: OutputMode,
) -> anyhow::Result<()> {
    let mut config = config_or_default(path)?;
    if let Some(out) = out {
        config.export_dir = out;
    }
    let diary = Diary::open(&config).await?;

    let exported = match format {
        ExportFormat::Sqlite => diary.export_all().await?,
        ExportFormat::Json => diary.export_json().await?,
    };

    if output_mode.is_human() {
        ui::success(&format!("Exported to {}", exported.path.display()));
        ui::summary_row("size:  ", &ui::human_bytes(exported.bytes));
        ui::summary_row("stores:", &exported.tables.join(", "));
    } else {
        emit_success(
            output_mode,
            "export",
            json!({ "path": exported.path, "bytes": exported.bytes, "stores": exported.tables }),
        )?;
    }
    Ok(())
}

pub async fn run_import(
    path: &Path,
    file: &Path,
    clear: bool,
    strict: bool,
    output_mode: OutputMode,
) -> anyhow::Result<()> {
    let diary = open_diary(path).await?;
    let options = ImportOptions {
        clear_before_import: clear,
        skip_errors: !strict,
    };
    let report = diary.import_with(file, options).await?;

    if output_mode.is_human() {
        if !is_quiet() {
            ui::header(&format!("Import from {}", file.display()));
        }
        for (store, count) in &report.imported {
            ui::summary_row(&format!("{}:", store), &format!("{} record(s)", count));
        }
        for error in &report.errors {
            ui::warn(error);
        }
        if report.success {
            ui::success(&format!("Imported {} record(s)", report.total_imported()));
        } else {
            ui::error(&format!("Import finished with {} error(s)", report.errors.len()));
        }
    } else {
        emit_success(output_mode, "import", serde_json::to_value(&report)?)?;
    }
    Ok(())
}

pub async fn run_stats(path: &Path, output_mode: OutputMode) -> anyhow::Result<()> {
    let config = config_or_default(path)?;
    let diary = Diary::open(&config).await?;
    let records = diary.engine().get_all(RECORDS_STORE).await?;
    let mut dates: Vec<&str> = records.iter().filter_map(|r| r.get("date").and_then(Value::as_str)).collect();
    dates.sort_unstable();
    dates.dedup();

    let db_path = config.database_path();
    let size = std::fs::metadata(&db_path).map(|m| m.len()).unwrap_or(0);
    let stores = diary.engine().store_names().await?;

    if output_mode.is_human() {
        if !is_quiet() {
            ui::header(&format!("{} {}", Icons::STATS, config.database_name));
        }
        let records_count = records.len().to_string();
        let dates_count = dates.len().to_string();
        let version = config.version.to_string();
        let size = ui::human_bytes(size);
        let location = db_path.display().to_string();
        let store_list = stores.join(", ");
        println!(
            "{}",
            ui::stats_table(&[
                ("Records", records_count.as_str()),
                ("Dates", dates_count.as_str()),
                ("Stores", store_list.as_str()),
                ("Version", version.as_str()),
                ("Size", size.as_str()),
                ("Location", location.as_str()),
            ])
        );
    } else {
        emit_success(
            output_mode,
            "stats",
            json!({
                "database": config.database_name,
                "version": config.version,
                "records": records.len(),
                "dates": dates.len(),
                "stores": stores,
                "bytes": size,
                "path": db_path,
            }),
        )?;
    }
    Ok(())
}

pub async fn run_drop(path: &Path, yes: bool, output_mode: OutputMode) -> anyhow::Result<()> {
    if !yes {
        anyhow::bail!("refusing to delete the database without --yes");
    }
    let diary = open_diary(path).await?;

    match diary.destroy().await? {
        DeleteOutcome::Deleted => {
            if output_mode.is_human() {
                ui::success(&format!("{} Database deleted", Icons::DATABASE));
            } else {
                emit_success(output_mode, "drop", json!({ "deleted": true }))?;
            }
            Ok(())
        }
        DeleteOutcome::Blocked(reason) => anyhow::bail!("database is in use: {}", reason),
    }
}
