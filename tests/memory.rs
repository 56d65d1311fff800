use std::any::Any;
use std::cell::Cell;
use std::mem;
use std::rc::Rc;

use brine_object::containers::DICT_ENTRY_SIZE;
use brine_object::prelude::*;

fn server() -> Server {
    Server::with_parts(
        Config::default(),
        Box::new(ManualClock::new(10)),
        Box::new(LibcAllocator),
    )
}

const HEADER: usize = mem::size_of::<Object>();

#[test]
fn string_sizes_are_exact() {
    let server = server();

    // One allocation for the whole embedded object; the estimate stays
    // within rounding distance of header + string header + bytes + NUL.
    let o = server.create_string_object(b"hello");
    let estimate = object_compute_size(&o, 5);
    assert_eq!(estimate, HEADER);
    assert!(estimate.abs_diff(HEADER + 5 + 1) <= 16);

    let long = vec![b'x'; 100];
    let o = server.create_string_object(&long);
    assert_eq!(object_compute_size(&o, 5), HEADER + 100);

    let o = server.create_string_object_from_long_long(1_000_000);
    assert_eq!(object_compute_size(&o, 5), HEADER);
}

#[test]
fn packed_aggregates_are_exact() {
    let server = server();

    let mut zl = Ziplist::new();
    zl.push(b"one");
    zl.push(b"two");
    let blob = zl.blob_len();
    let o = server.create_object(Value::List(ListValue::Ziplist(zl)));
    assert_eq!(object_compute_size(&o, 5), HEADER + blob);

    let mut is = IntSet::new();
    for v in [3, 1, 2] {
        is.add(v);
    }
    let blob = is.blob_len();
    let o = server.create_object(Value::Set(SetValue::Intset(is)));
    assert_eq!(object_compute_size(&o, 5), HEADER + blob);
    assert_eq!(blob, 8 + 2 * 3);
}

#[test]
fn quicklist_cost_extrapolates_from_sampled_nodes() {
    let server = server();

    let mut ql = Quicklist::new();
    for i in 0..300 {
        ql.push(format!("element-{i:05}").as_bytes());
    }
    let node_costs: Vec<usize> = ql
        .nodes()
        .iter()
        .map(|n| mem::size_of_val(n) + n.blob_len())
        .collect();
    let count = ql.len();
    let o = server.create_object(Value::List(ListValue::Quicklist(ql)));

    // Sampling two of the three nodes averages their cost over the
    // declared element count.
    let sampled: usize = node_costs.iter().take(2).sum();
    let expected = HEADER
        + mem::size_of::<Quicklist>()
        + (sampled as f64 / 2.0 * count as f64) as usize;
    assert_eq!(object_compute_size(&o, 2), expected);

    let all: usize = node_costs.iter().sum();
    let expected_all = HEADER
        + mem::size_of::<Quicklist>()
        + (all as f64 / node_costs.len() as f64 * count as f64) as usize;
    assert_eq!(object_compute_size(&o, 0), expected_all);
}

#[test]
fn set_and_hash_tables_sample_uniform_entries_exactly() {
    let server = server();

    let mut members = Dict::new();
    for i in 0..500 {
        members.insert(Sds::new(format!("m{i:04}").as_bytes()), ());
    }
    let slots = members.slots();
    let len = members.len();
    let o = server.create_object(Value::Set(SetValue::Ht(members)));

    let per_entry = DICT_ENTRY_SIZE + 5;
    let base = HEADER + mem::size_of::<Dict<()>>() + mem::size_of::<usize>() * slots;
    let expected = base + (per_entry as f64 * len as f64) as usize;
    assert_eq!(object_compute_size(&o, 7), expected);
    assert_eq!(object_compute_size(&o, 0), expected);
}

#[test]
fn zset_sampling_charges_nodes_and_table_entries() {
    let server = server();

    let mut zs = Zset::new();
    for i in 0..100 {
        zs.insert(Sds::new(format!("mem{i:03}").as_bytes()), i as f64);
    }
    let slots = zs.slots();
    let len = zs.len();
    let o = server.create_object(Value::Zset(ZsetValue::Skiplist(Box::new(zs))));

    let sampled = object_compute_size(&o, 10);
    let base = HEADER + mem::size_of::<Zset>() + mem::size_of::<usize>() * slots;
    assert!(sampled > base);
    // Uniform members: sampling does not change the figure.
    assert_eq!(sampled, object_compute_size(&o, 0));
    assert_eq!((sampled - base) % len, 0);
}

struct CountingModule {
    frees: Rc<Cell<u32>>,
    reported: Option<usize>,
}

impl ModuleType for CountingModule {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn free(&self, _value: Box<dyn Any>) {
        self.frees.set(self.frees.get() + 1);
    }

    fn mem_usage(&self, _value: &dyn Any) -> Option<usize> {
        self.reported
    }
}

#[test]
fn module_values_delegate_size_and_free() {
    let server = server();
    let frees = Rc::new(Cell::new(0));

    let mtype = Rc::new(CountingModule {
        frees: Rc::clone(&frees),
        reported: Some(123),
    });
    let o = server.create_module_object(mtype, Box::new(5u8));
    assert_eq!(o.object_type(), ObjectType::Module);
    assert_eq!(object_compute_size(&o, 5), HEADER + 123);

    decr_ref_count(o);
    assert_eq!(frees.get(), 1);

    let mtype = Rc::new(CountingModule {
        frees: Rc::clone(&frees),
        reported: None,
    });
    let o = server.create_module_object(mtype, Box::new(6u8));
    assert_eq!(object_compute_size(&o, 5), HEADER);
}

#[test]
fn overhead_report_sums_its_parts() {
    let mut server = server();

    server.memory_metrics_mut().set_used_memory(6 * 1024 * 1024);
    server.memory_metrics_mut().mark_startup();
    server.memory_metrics_mut().set_used_memory(40 * 1024 * 1024);
    server
        .memory_metrics_mut()
        .set_resident_set_size(50 * 1024 * 1024);
    server.set_repl_backlog(1 * 1024 * 1024);
    server.set_aof_buffers(4096, 8192);
    server.add_client(ClientInfo {
        output_buffer: 1000,
        query_buffer: 200,
        replica: false,
    });
    server.add_client(ClientInfo {
        output_buffer: 5000,
        query_buffer: 300,
        replica: true,
    });

    for i in 0..10 {
        let value = server.create_string_object(format!("value-{i}").as_bytes());
        let key = Sds::new(format!("key-{i}").as_bytes());
        server.db_mut(0).add(key.clone(), value);
        if i % 2 == 0 {
            server.db_mut(0).set_expire(key, 1_000_000 + i as u64);
        }
    }

    let mh = server.memory_overhead();
    let client_struct = mem::size_of::<ClientInfo>() as u64;

    assert_eq!(mh.total_allocated, 40 * 1024 * 1024);
    assert_eq!(mh.startup_allocated, 6 * 1024 * 1024);
    assert_eq!(mh.peak_allocated, 40 * 1024 * 1024);
    assert_eq!(mh.repl_backlog, 1024 * 1024);
    assert_eq!(mh.aof_buffer, 4096 + 8192);
    assert_eq!(mh.clients_normal, 1200 + client_struct);
    assert_eq!(mh.clients_slaves, 5300 + client_struct);
    assert!((mh.fragmentation - 1.25).abs() < 1e-9);

    assert_eq!(mh.dbs.len(), 1);
    assert_eq!(mh.total_keys, 10);
    let db = server.db(0);
    let ptr = mem::size_of::<usize>() as u64;
    let expected_main = 10 * (DICT_ENTRY_SIZE as u64 + mem::size_of::<Object>() as u64)
        + db.main_slots() as u64 * ptr;
    assert_eq!(mh.dbs[0].overhead_ht_main, expected_main);
    let expected_expires =
        5 * DICT_ENTRY_SIZE as u64 + db.expires_slots() as u64 * ptr;
    assert_eq!(mh.dbs[0].overhead_ht_expires, expected_expires);

    let expected_total = mh.startup_allocated
        + mh.repl_backlog
        + mh.clients_normal
        + mh.clients_slaves
        + mh.aof_buffer
        + mh.dbs[0].overhead_ht_main
        + mh.dbs[0].overhead_ht_expires;
    assert_eq!(mh.overhead_total, expected_total);
    assert_eq!(mh.dataset, mh.total_allocated - mh.overhead_total);

    let net = mh.total_allocated - mh.startup_allocated;
    assert_eq!(mh.bytes_per_key, net / 10);
    assert!((mh.dataset_perc - mh.dataset as f64 * 100.0 / net as f64).abs() < 1e-9);
    assert!((mh.peak_perc - 100.0).abs() < 1e-9);
}

#[test]
fn doctor_reports_every_tripped_heuristic() {
    let mut server = server();

    server.memory_metrics_mut().set_used_memory(30 * 1024 * 1024);
    server.memory_metrics_mut().set_used_memory(10 * 1024 * 1024);
    server
        .memory_metrics_mut()
        .set_resident_set_size(20 * 1024 * 1024);
    server.add_client(ClientInfo {
        output_buffer: 300 * 1024,
        query_buffer: 0,
        replica: false,
    });
    server.add_client(ClientInfo {
        output_buffer: 11 * 1024 * 1024,
        query_buffer: 0,
        replica: true,
    });

    let report = server.memory_doctor_report();
    assert!(report.starts_with("Sam, I detected a few issues in this Brine instance memory implants:\n\n"));
    assert!(report.contains(" * Peak memory:"));
    assert!(report.contains(" * High fragmentation:"));
    assert!(report.contains("The currently used allocator is \"libc\"."));
    assert!(report.contains(" * Big slave buffers:"));
    assert!(report.contains(" * Big client buffers:"));
    assert!(report.ends_with("I'm here to keep you safe, Sam. I want to help you.\n"));
}

#[test]
fn doctor_with_no_findings_says_so() {
    let mut server = server();
    server.memory_metrics_mut().set_used_memory(10 * 1024 * 1024);
    server
        .memory_metrics_mut()
        .set_resident_set_size(10 * 1024 * 1024);

    assert_eq!(
        server.memory_doctor_report(),
        "Hi Sam, I can't find any memory issue in your instance. \
         I can only account for what occurs on this base.\n"
    );
}
