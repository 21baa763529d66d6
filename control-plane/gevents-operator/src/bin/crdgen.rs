use gevents_operator::crd::broker_cell::BrokerCell;
use gevents_operator::crd::pull_subscription::PullSubscription;
use gevents_operator::crd::storage_source::StorageSource;
use gevents_operator::crd::topic::Topic;
use kube::core::CustomResourceExt;

fn main() {
    let crds = [
        StorageSource::crd(),
        Topic::crd(),
        PullSubscription::crd(),
        BrokerCell::crd(),
    ];
    for crd in crds {
        let yaml = serde_yaml::to_string(&crd).expect("serialize CRD to YAML");
        println!("---\n{}", yaml);
    }
}
