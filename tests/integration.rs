//! End-to-end test driving a project file all the way through
//! [`devs_core::Coordinator::run`] with a real file-backed [`CsvStream`],
//! mirroring how `xdevs-run` wires things together. Grounded on the
//! `coordinator` module's own in-crate tests (`drives_generator_through_...`,
//! `timed_view_samples_and_writes_to_stream`), lifted out to a `tests/`
//! integration binary so it exercises the crate the way an external
//! embedder would: through `devs_core::project::Project` rather than by
//! constructing a `ModelGraph` by hand.

use devs_core::dynamics::{Dynamics, OutputBag};
use devs_core::event::ObservationEvent;
use devs_core::factory::ModelFactory;
use devs_core::model::builder::build_graph;
use devs_core::project::{Project, ViewKind};
use devs_core::stream::CsvStream;
use devs_core::value::Value;
use devs_core::view::View;
use devs_core::{Coordinator, KernelConfig, Time};
use std::collections::BTreeMap;
use std::io::Read;

#[derive(Debug, Default)]
struct Generator {
    count: i64,
}

impl Dynamics for Generator {
    fn init(&mut self, _time: Time) -> Time {
        Time::ZERO
    }
    fn output(&self, _time: Time) -> OutputBag {
        let mut bag = OutputBag::new();
        bag.insert("p".to_string(), Value::Integer(self.count));
        bag
    }
    fn internal_transition(&mut self, _time: Time) {
        self.count += 1;
    }
    fn external_transition(&mut self, _elapsed: Time, _events: &BTreeMap<String, Value>) {}
    fn time_advance(&self) -> Time {
        if self.count < 3 {
            Time(1.0)
        } else {
            Time::INFINITY
        }
    }
    fn observation(&self, event: &ObservationEvent) -> Option<Value> {
        (event.port == "p").then_some(Value::Integer(self.count))
    }
}

#[derive(Debug, Default)]
struct Sink {
    received: Vec<i64>,
}

impl Dynamics for Sink {
    fn init(&mut self, _time: Time) -> Time {
        Time::INFINITY
    }
    fn internal_transition(&mut self, _time: Time) {}
    fn external_transition(&mut self, _elapsed: Time, events: &BTreeMap<String, Value>) {
        if let Some(Value::Integer(v)) = events.get("i") {
            self.received.push(*v);
        }
    }
    fn time_advance(&self) -> Time {
        Time::INFINITY
    }
}

const PROJECT_XML: &str = r#"
<project>
  <experiment name="trivial-gen" begin="0" duration="5" seed="0"/>
  <dynamics>
    <dynamic name="gen" library="gen"/>
    <dynamic name="sink" library="sink"/>
  </dynamics>
  <views>
    <view name="v" type="timed" timestep="1.0" output="csv"/>
  </views>
  <observables>
    <observable model="gen" port="p" views="v"/>
  </observables>
  <structures>
    <model name="top" type="coupled">
      <model name="gen" type="atomic" dynamics="gen">
        <out><port name="p"/></out>
      </model>
      <model name="sink" type="atomic" dynamics="sink">
        <in><port name="i"/></in>
      </model>
      <connections>
        <connection type="internal" from="gen" fromport="p" to="sink" toport="i"/>
      </connections>
    </model>
  </structures>
</project>
"#;

/// Parses a project file, elaborates it with in-process registered
/// `Dynamics` (standing in for `register_plugin`'s dynamic-library path,
/// which isn't exercisable without a real shared object), and runs it to
/// completion while a [`CsvStream`] writes to a real temporary file.
#[test]
fn project_file_runs_end_to_end_and_writes_csv_to_disk() {
    let project = Project::parse(PROJECT_XML).expect("project parses");

    let config = project.kernel_config();
    let mut factory = ModelFactory::new(&config);
    factory.register("gen", |_name, _conditions| Box::new(Generator::default()));
    factory.register("sink", |_name, _conditions| Box::new(Sink::default()));

    let graph = build_graph(project.build_graph());
    let sims = factory
        .elaborate(&graph, &project.conditions)
        .expect("elaboration succeeds");

    let gen_node = graph
        .atomic_nodes()
        .find(|n| n.name == "gen")
        .expect("gen node exists");
    let mut view = View::new_timed("v", Time::from(config.begin_time), 1.0);
    view.observe(gen_node.sim_id().unwrap(), "p", "top.gen");

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("trivial-gen.csv");
    let file = std::fs::File::create(&path).expect("create temp csv file");

    let mut coordinator = Coordinator::new(
        graph,
        sims,
        vec![view],
        vec![Box::new(CsvStream::new(file))],
        config,
    );
    coordinator.run().expect("run completes");

    let mut written = String::new();
    std::fs::File::open(&path)
        .expect("reopen temp csv file")
        .read_to_string(&mut written)
        .expect("read temp csv file");

    assert!(written.contains("time,model,port,value"));
    assert!(written.contains("0,top.gen,p,0"));
    assert!(written.contains("1,top.gen,p,1"));
    assert!(written.contains("2,top.gen,p,2"));
    assert!(written.contains("# end="));
}
