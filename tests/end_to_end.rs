use std::{fs, io::Write, path::Path};

use sales_ranking::{
    output, Config, Consolidated, GroupRegistry, Identity, Metric, Pipeline, ProductCode, Summary,
    Table,
};

const HEADER: &str = "CODPRODUTO,DESCRICAO,DATA,QTDE,QTDE REAL,Fat Liquido,Lucro / Prej.,RAZAO,VENDEDOR";

/// Twelve sales of three products. 1924 and 8006 are both ACEM; 1830 is on
/// its own and sells less by weight than the two together.
fn export(dir: &Path) -> std::path::PathBuf {
    let mut csv = String::from(HEADER);
    csv.push('\n');
    for day in 1..=4 {
        csv.push_str(&format!("1924,ACEM RESFRIADO,0{day}/05/2025,2,\"20,00\",\"R$ 200,00\",\"R$ 20,00\",CLIENTE {day},ANA\n"));
        csv.push_str(&format!("8006,ACEM CONGELADO,0{day}/05/2025,1,\"15,00\",\"R$ 150,00\",\"R$ 30,00\",CLIENTE {day},BRUNO\n"));
        csv.push_str(&format!("1830,CORACAO DE ALCATRA,0{day}/05/2025,3,\"30,00\",\"R$ 600,00\",\"R$ 90,00\",CLIENTE 1,ANA\n"));
    }
    let path = dir.join("export.csv");
    fs::write(&path, csv).unwrap();
    path
}

fn setup() -> (tempfile::TempDir, Table, GroupRegistry, Config) {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        header_row: 0,
        output_dir: dir.path().to_path_buf(),
        ..Config::default()
    };
    let table = Table::from_path(export(dir.path()), &config).unwrap();
    let mut groups = GroupRegistry::new();
    groups.add_group("ACEM", ["1924", "8006"]);
    (dir, table, groups, config)
}

#[test]
fn tonnage_ranking_merges_grouped_products() {
    let (_dir, table, groups, config) = setup();
    assert_eq!(table.rows().len(), 12);
    let report = Pipeline::from_config(&groups, &config).run(&table, Metric::Tonnage);
    assert_eq!(report.pages.len(), 1);
    let entries = &report.pages[0].entries;
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].position, 1);
    assert_eq!(entries[0].identity, Identity::Group("ACEM".into()));
    assert_eq!(entries[0].value, 140.0);
    assert_eq!(entries[0].count, 8);
    assert_eq!(entries[1].identity, Identity::Product(ProductCode::from("1830")));
    assert_eq!(entries[1].label, "CORACAO DE ALCATRA");
    assert_eq!(entries[1].value, 120.0);
    assert_eq!(report.total, 260.0);
}

#[test]
fn margin_ranking_uses_ratio_of_sums() {
    let (_dir, table, groups, config) = setup();
    let report = Pipeline::from_config(&groups, &config).run(&table, Metric::Margin);
    let entries = &report.pages[0].entries;
    // ACEM: 200 profit on 1400 revenue; 1830: 360 on 2400
    assert_eq!(entries[0].identity, Identity::Product(ProductCode::from("1830")));
    assert!((entries[0].value - 15.0).abs() < 1e-9);
    assert!((entries[1].value - 200.0 / 1400.0 * 100.0).abs() < 1e-9);
}

#[test]
fn running_twice_writes_identical_reports() {
    let (dir, table, groups, config) = setup();
    let pipeline = Pipeline::from_config(&groups, &config);
    let report_dir = output::create_report_dir(dir.path(), Some(sales_ranking::Period { month: 5, year: 2025 })).unwrap();
    assert!(report_dir.ends_with("Sales Ranking - May 2025"));
    let mut written = Vec::new();
    for _ in 0..2 {
        for metric in Metric::ALL {
            let report = pipeline.run(&table, metric);
            let path = report_dir.join(output::metric_file_name(metric, report.period, config.page_size));
            output::write_atomically(&path, |file| Ok(write!(file, "{report}")?)).unwrap();
            written.push(fs::read_to_string(&path).unwrap());
        }
    }
    let (first, second) = written.split_at(Metric::ALL.len());
    assert_eq!(first, second);
    let mut names: Vec<String> = fs::read_dir(&report_dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(
        names,
        [
            "Sales Ranking - Margin - May 2025 - 5 per page.txt",
            "Sales Ranking - Revenue - May 2025 - 5 per page.txt",
            "Sales Ranking - Tonnage - May 2025 - 5 per page.txt",
        ]
    );
}

#[test]
fn summary_and_consolidated_workbook_cover_the_export() {
    let (dir, table, groups, config) = setup();
    let summary = Summary::build(&table, &config.columns).unwrap();
    assert_eq!((summary.customers, summary.salespeople, summary.products), (4, 2, 3));

    let consolidated = Consolidated::build(&table, &groups, &config.columns).unwrap();
    assert_eq!(consolidated.rows.len(), 2);
    assert_eq!(consolidated.rows[0].code(), "GROUP");
    assert_eq!(consolidated.rows[0].average_weight, 140.0 / 12.0);
    assert_eq!(consolidated.rows[1].code(), "1830");

    let path = dir.path().join(output::workbook_file_name(consolidated.period));
    consolidated.write_xlsx(&path).unwrap();
    assert!(fs::metadata(&path).unwrap().len() > 0);
}
