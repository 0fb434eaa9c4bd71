use rusqlite::Connection;
use serde_json::json;
use std::fs;
use std::path::PathBuf;
use std::process::Command;

/// 示例：准备一个 SQLite 库和两个任务文件，其中一个连接目标不存在
fn prepare_task_dir() -> PathBuf {
    let task_dir = PathBuf::from("/tmp/qstore-demo");

    // 清除上次运行的结果
    if task_dir.exists() {
        fs::remove_dir_all(&task_dir).unwrap();
    }
    fs::create_dir_all(&task_dir).unwrap();

    let db = task_dir.join("scans.db");
    let conn = Connection::open(&db).unwrap();
    conn.execute_batch(
        "CREATE TABLE scans (barcode TEXT, carrier INTEGER, ts TEXT);
         INSERT INTO scans VALUES ('4006381333931', 17, '2025-12-27 10:00:00');
         INSERT INTO scans VALUES ('say \"hi\"', 18, '2025-12-27 10:05:00');",
    )
    .unwrap();

    fs::write(
        task_dir.join("carriers.sql"),
        format!(
            "User Id=reader;Password=secret;Data Source=sqlite:{}\nSELECT barcode, carrier, ts\nFROM scans\nORDER BY ts\n",
            db.display()
        ),
    )
    .unwrap();
    fs::write(
        task_dir.join("offline.sql"),
        "User Id=reader;Password=secret;Data Source=sqlite:/tmp/qstore-demo/missing.db\nSELECT 1\n",
    )
    .unwrap();

    // 演示环境里不调用 S3 上传脚本
    let config = json!({
        "max_concurrency": 4,
        "uploader": { "program": "echo", "args": ["upload skipped in demo"] }
    });
    fs::write(
        task_dir.join("qstore.json"),
        serde_json::to_string_pretty(&config).unwrap(),
    )
    .unwrap();

    task_dir
}

fn main() {
    println!("=== qstore 批处理示例 ===\n");

    let task_dir = prepare_task_dir();
    println!("任务目录已创建: {:?}", task_dir);
    println!("正在执行批处理...\n");

    let status = Command::new("cargo")
        .args(["run", "-p", "qstore-task", "--", "--dir"])
        .arg(&task_dir)
        .status()
        .expect("启动批处理失败");

    if status.success() {
        println!("\n✓ 批处理结束");
    } else {
        println!("\n✗ 批处理异常退出");
    }

    println!("注意:");
    println!("  1. carriers.sql 会生成 StorageResults/<日期>/carriers_<时间>.csv");
    println!("  2. offline.sql 的连接目标不存在，只会在日志中记录失败");
    println!("  3. 日志写入 {:?}", task_dir.join("logs/qstore.log"));
}
