//! # stripe-reader 完整使用案例
//!
//! 1. 定义 schema 并用 StripeFileWriter 写出文件
//! 2. 打开 Reader，查看文件元数据
//! 3. 顺序读取 / 批量读取 / seek
//! 4. 列选择与 Dict 形态的 struct
//! 5. 按 stripe 读取
//! 6. 文件级与 row group 级统计
//! 7. bloom filter 查询
//! 8. 自定义时间戳转换器

use std::fs::File;
use std::io::BufWriter;

use stripe_reader::{
    engine::{StripeFileWriter, WriterOptions},
    Converter, ConverterTable, Datum, Decimal, Reader, ReaderOptions, StructRepr, TypeDescription,
    TypeKind, Value, Whence,
};

fn main() -> stripe_reader::Result<()> {
    println!("═══════════════════════════════════════════════════════════");
    println!("   stripe-reader 演示                                      ");
    println!("═══════════════════════════════════════════════════════════\n");

    // =========================================================================
    // 1. 写出订单文件
    // =========================================================================
    println!("【1】写出订单文件 ...");
    // 列号：root 0, order_id 1, user 2, amount 3, order_date 4, paid_at 5, price 6
    let schema = TypeDescription::struct_of(vec![
        ("order_id",   TypeDescription::primitive(TypeKind::Long)),
        ("user",       TypeDescription::primitive(TypeKind::String)),
        ("amount",     TypeDescription::primitive(TypeKind::Double)),
        ("order_date", TypeDescription::primitive(TypeKind::Date)),
        ("paid_at",    TypeDescription::primitive(TypeKind::Timestamp)),
        ("price",      TypeDescription::decimal(12, 2)),
    ]);
    println!("    schema = {schema}");

    let path = std::env::temp_dir().join("stripe-reader-demo.stripes");
    let options = WriterOptions::new()
        .stripe_rows(400)
        .row_index_stride(100)
        .bloom_filter_columns([2])
        .writer_timezone("Asia/Shanghai")
        .user_metadata("source", "demo");
    let out = BufWriter::new(File::create(&path).map_err(stripe_reader::engine::EngineError::from)?);
    let mut writer = StripeFileWriter::new(out, schema, options)?;
    for i in 0..1_000i64 {
        writer.write_row(vec![
            Datum::Long(10_000 + i),
            Datum::string(&format!("user-{}", i % 37)),
            if i % 50 == 0 { Datum::Null } else { Datum::Double(i as f64 * 1.25) },
            Datum::Date(19_000 + i / 100),
            Datum::Timestamp { seconds: 1_640_000_000 + i * 30, nanos: 0 },
            Datum::Decimal(Decimal::new(999 + i as i128, 2)),
        ])?;
    }
    writer.finish()?;
    println!("    ✓ 写入 1000 行 → {}\n", path.display());

    // =========================================================================
    // 2. 打开 Reader
    // =========================================================================
    println!("【2】打开 Reader ...");
    let mut reader = Reader::open_with(&path, ReaderOptions::new().batch_size(128))?;
    println!("    rows = {}, stripes = {}", reader.len(), reader.number_of_stripes());
    println!("    compression = {:?}, stride = {}", reader.compression(), reader.row_index_stride());
    println!("    writer = {}", reader.writer());
    println!();

    // =========================================================================
    // 3. 顺序读取与 seek
    // =========================================================================
    println!("【3】顺序读取与 seek ...");
    if let Some(row) = reader.next_row()? {
        println!("    第一行: {row:?}");
    }
    let batch = reader.read(5)?;
    println!("    read(5) → {} 行，当前位置 {}", batch.len(), reader.current_row());
    reader.seek(-3, Whence::End)?;
    let tail = reader.read(-1)?;
    println!("    seek(-3, End) 后读到 {} 行", tail.len());
    reader.seek(0, Whence::Start)?;
    println!("    seek(0, Start) → 位置 {}\n", reader.current_row());

    // =========================================================================
    // 4. 列选择 + Dict
    // =========================================================================
    println!("【4】列选择（按名字）+ Dict 形态 ...");
    let mut narrow = Reader::open_with(
        &path,
        ReaderOptions::new().column_names(["user", "order_id"]).struct_repr(StructRepr::Dict),
    )?;
    println!("    selected = {}", narrow.selected_schema());
    if let Some(row) = narrow.next_row()? {
        println!("    user = {:?}", row.field("user"));
    }
    println!();

    // =========================================================================
    // 5. 按 stripe 读取
    // =========================================================================
    println!("【5】按 stripe 读取 ...");
    for stripe in reader.iter_stripes() {
        let mut stripe = stripe?;
        let first = stripe.next_row()?;
        println!(
            "    stripe {}: offset={} bytes={} rows={} first_row={} tz={} 首行 id={:?}",
            stripe.index(),
            stripe.offset(),
            stripe.byte_length(),
            stripe.len(),
            stripe.first_row(),
            stripe.writer_timezone(),
            first.as_ref().and_then(|r| r.get(0)).and_then(Value::as_i64),
        );
    }
    println!();

    // =========================================================================
    // 6. 统计信息
    // =========================================================================
    println!("【6】统计信息 ...");
    for column in [1, 3, 4, 6] {
        let ty = reader.schema().find(column).cloned();
        let Some(ty) = ty else { continue };
        let rec = reader.create_statistics(&ty, column)?;
        print!("    col {column} ({ty}): has_null={} values={}", rec.has_null, rec.number_of_values);
        for (field, value) in rec.fields() {
            print!(" {field}={value:?}");
        }
        println!();
    }
    let stripe = reader.read_stripe(0)?;
    let groups = stripe.create_statistics(&TypeDescription::primitive(TypeKind::Long), 1)?;
    println!("    stripe 0 的 order_id 共 {} 个 row group", groups.len());
    println!();

    // =========================================================================
    // 7. bloom filter
    // =========================================================================
    println!("【7】bloom filter ...");
    let user = reader.get_item(2)?;
    println!("    条目数 = {}", user.bloom_filters().len());
    for probe in ["user-5", "nobody"] {
        println!("    may_contain({probe:?}) = {}", user.may_contain(&Datum::string(probe)));
    }
    println!("    stripe 0 带 bloom 的列 = {:?}\n", stripe.bloom_filter_columns()?);

    // =========================================================================
    // 8. 自定义时间戳转换器
    // =========================================================================
    println!("【8】自定义时间戳转换器 ...");
    let converters = ConverterTable::default()
        .with(TypeKind::Timestamp, Converter::timestamp(|s, n| Ok(Value::Tuple(vec![s.into(), n.into()]))))?;
    let mut raw = Reader::open_with(&path, ReaderOptions::new().column_indices([4]).converters(converters))?;
    if let Some(row) = raw.next_row()? {
        println!("    paid_at = {row:?}");
    }

    let _ = std::fs::remove_file(&path);
    println!("\n═══════════════════════════════════════════════════════════");
    println!("   全部演示完成 ✓");
    println!("═══════════════════════════════════════════════════════════");
    Ok(())
}
