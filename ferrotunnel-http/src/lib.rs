pub mod ingress;

pub use ingress::HttpIngressSpawner;
