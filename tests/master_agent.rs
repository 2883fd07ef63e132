//! End-to-end: CSV exports in, routed and synthesized answers out.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use pharmacy_agents::agents::{Consultation, RouteSource};
use pharmacy_agents::config::DataConfig;
use pharmacy_agents::data::{read_inventory, read_sales, read_suppliers};
use pharmacy_agents::{
    load_snapshot, AgentError, AgentKind, CompletionBackend, CompletionError, LlmService, MasterAgent, RotationCursor,
    Snapshot,
};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Answers routing prompts with a fixed plan and records every prompt it sees
struct FakeModel {
    route: Option<String>,
    prompts: Mutex<Vec<String>>,
}

impl FakeModel {
    fn routing(route: &str) -> Arc<Self> {
        Arc::new(Self {
            route: Some(route.to_string()),
            prompts: Mutex::new(Vec::new()),
        })
    }

    fn offline() -> Arc<Self> {
        Arc::new(Self {
            route: None,
            prompts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl CompletionBackend for FakeModel {
    async fn complete(
        &self,
        _credential: &str,
        _model: &str,
        prompt: &str,
        _temperature: f32,
    ) -> Result<String, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match &self.route {
            None => Err(CompletionError::QuotaExceeded("RESOURCE_EXHAUSTED".into())),
            Some(route) if prompt.contains("routing layer") => Ok(route.clone()),
            Some(_) => Ok("Synthesized answer".to_string()),
        }
    }
}

fn as_of() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

fn sales_csv() -> String {
    let mut csv = String::from("date,sku,product_name,category,quantity_sold,unit_price,total_sale,store_id,is_prescription\n");
    for i in 1..=60 {
        let day = as_of() - Duration::days(i);
        let qty = 10 + (i % 7);
        writeln!(csv, "{},MED001,Paracetamol 500mg,Analgesic,{},5.0,{},STORE_A,False", day, qty, qty * 5).unwrap();
        writeln!(csv, "{},MED001,Paracetamol 500mg,Analgesic,2,5.0,10.0,STORE_B,False", day).unwrap();
        writeln!(csv, "{},MED002,Flu Relief Syrup,Cold & Flu,4,12.0,48.0,STORE_A,False", day).unwrap();
    }
    csv
}

const INVENTORY_CSV: &str = "\
sku,product_name,category,unit_price,store_id,current_stock,expiry_date,reorder_point,supplier_id
MED001,Paracetamol 500mg,Analgesic,5.0,STORE_A,30,2025-03-01,,SUP001
MED001,Paracetamol 500mg,Analgesic,5.0,STORE_B,600,2025-03-01,,SUP001
MED002,Flu Relief Syrup,Cold & Flu,12.0,STORE_A,80,2024-06-12,,SUP002
MED009,Vitamin C 1000mg,Supplements,9.0,STORE_B,200,2025-12-31,,SUP002
";

const SUPPLIERS_CSV: &str = "\
supplier_id,supplier_name,fill_rate,cancellation_rate,delay_rate,avg_lead_time_days,lead_time_variance,on_time_delivery_rate,price_competitiveness,avg_shelf_life_pct,expired_on_arrival_rate,gmp_certified,iso_certified,fda_approved,audit_score,compliance_violations,skus
SUP001,MedSupply Co,0.96,0.01,0.03,3,0.5,0.94,0.85,90,0.002,True,True,True,94,0,MED001;MED002
SUP002,PharmaDirect,0.90,0.06,0.04,5,1.2,0.85,0.92,80,0.004,True,False,True,85,1,*
";

fn snapshot() -> Snapshot {
    let origin = Path::new("memory.csv");
    let sales = read_sales(sales_csv().as_bytes(), origin).unwrap();
    let inventory = read_inventory(INVENTORY_CSV.as_bytes(), origin).unwrap();
    let suppliers = read_suppliers(SUPPLIERS_CSV.as_bytes(), origin).unwrap();
    Snapshot::new(as_of(), sales, inventory).with_suppliers(suppliers)
}

fn master(backend: Arc<FakeModel>) -> MasterAgent {
    let llm = LlmService::new(backend, vec!["key-1".into(), "key-2".into()], vec!["model-a".into()], 0.7);
    MasterAgent::new(snapshot(), llm)
}

#[tokio::test]
async fn routed_question_consults_each_agent_and_synthesizes() {
    let backend = FakeModel::routing(
        r#"{"agents": ["demand", "supplier", "pricing"], "parameters": {"sku": "MED001", "days": "14", "quantity": "500"}, "type": "multi", "reasoning": "buying decision"}"#,
    );
    let mut master = master(backend.clone());

    let answer = master.ask("How much Paracetamol should I buy and from whom?").await;

    assert_eq!(answer.plan.source, RouteSource::Ai);
    assert_eq!(answer.plan.agents, vec![AgentKind::Demand, AgentKind::Supplier, AgentKind::Pricing]);
    assert!(answer.synthesized);
    assert_eq!(answer.answer, "Synthesized answer");
    assert!(answer.consultations.iter().all(Consultation::succeeded));

    let supplier = answer
        .consultations
        .iter()
        .find_map(|c| match c {
            Consultation::Completed(r) if r.agent == AgentKind::Supplier => Some(r),
            _ => None,
        })
        .unwrap();
    let allocation = supplier.data["split_order"]["allocation"].as_array().unwrap();
    let total: u64 = allocation.iter().map(|a| a["quantity"].as_u64().unwrap()).sum();
    assert_eq!(total, 500);

    let prompts = backend.prompts.lock().unwrap();
    assert_eq!(prompts.len(), 2);
    assert!(prompts[1].contains("DEMAND AGENT:"));
    assert!(prompts[1].contains("SUPPLIER AGENT:"));
}

#[tokio::test]
async fn offline_model_falls_back_to_keywords_and_summaries() {
    let mut master = master(FakeModel::offline());

    let answer = master.ask("Which items are expiring soon?").await;

    assert_eq!(answer.plan.source, RouteSource::Keyword);
    assert_eq!(answer.plan.agents, vec![AgentKind::Inventory]);
    assert!(!answer.synthesized);
    assert!(answer.answer.contains("**INVENTORY:**"));
    assert!(answer.answer.contains("1 critical"));
    assert_eq!(master.cursor(), RotationCursor(0));
    assert_eq!(master.history().len(), 1);
}

#[tokio::test]
async fn failing_calculator_is_reported_not_fatal() {
    let backend = FakeModel::routing("AGENTS: demand, inventory\nPARAMETERS: sku=MED009\nTYPE: multi\nREASONING: vitamin outlook");
    let mut master = master(backend);

    let answer = master.ask("What is the outlook for vitamin C?").await;

    match &answer.consultations[0] {
        Consultation::Failed { agent, message } => {
            assert_eq!(*agent, AgentKind::Demand);
            assert!(message.contains("Insufficient history"), "{}", message);
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert!(answer.consultations[1].succeeded());
    assert!(answer.synthesized);

    let rendered = answer.to_string();
    assert!(rendered.contains("✗ demand agent"));
    assert!(rendered.contains("✓ inventory agent"));
}

#[tokio::test]
async fn history_feeds_routing_context() {
    let backend = FakeModel::routing(r#"{"agents": ["inventory"], "reasoning": "stock"}"#);
    let mut master = master(backend.clone());

    master.ask("first question about stock").await;
    master.ask("and what about tomorrow?").await;

    let prompts = backend.prompts.lock().unwrap();
    let second_routing = prompts.iter().filter(|p| p.contains("routing layer")).nth(1).unwrap();
    assert!(second_routing.contains("User: first question about stock"));

    drop(prompts);
    master.clear_history();
    assert!(master.history().is_empty());
}

fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("pharmacy-agents-{}-{}", name, std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn data_config(dir: &Path) -> DataConfig {
    DataConfig {
        data_dir: dir.to_path_buf(),
        sales_file: "sales_history.csv".into(),
        inventory_file: "current_inventory.csv".into(),
        suppliers_file: "suppliers.csv".into(),
        pricing_file: "pricing_signals.csv".into(),
        as_of: Some(as_of()),
    }
}

#[test]
fn loads_snapshot_from_directory_without_optional_files() {
    let dir = scratch_dir("load");
    std::fs::write(dir.join("sales_history.csv"), sales_csv()).unwrap();
    std::fs::write(dir.join("current_inventory.csv"), INVENTORY_CSV).unwrap();

    let snapshot = load_snapshot(&data_config(&dir)).unwrap();
    assert_eq!(snapshot.as_of, as_of());
    assert_eq!(snapshot.inventory.len(), 4);
    assert!(snapshot.suppliers.is_empty());
    assert!(snapshot.pricing_signals.is_empty());

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn missing_inventory_file_is_reported() {
    let dir = scratch_dir("missing");
    std::fs::write(dir.join("sales_history.csv"), sales_csv()).unwrap();

    match load_snapshot(&data_config(&dir)) {
        Err(AgentError::MissingDataFile { path }) => assert!(path.ends_with("current_inventory.csv")),
        other => panic!("expected MissingDataFile, got {:?}", other.map(|s| s.inventory.len())),
    }

    std::fs::remove_dir_all(&dir).ok();
}
