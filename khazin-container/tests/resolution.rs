
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use khazin_container::prelude::*;

struct A;
struct B;
struct Leaf;
struct Left;
struct Right;
struct Top;

#[test]
fn runtime_cycle_reports_exact_members() {
    let container = Container::builder()
        .transient_with::<A>(|injector| {
            injector.resolve::<B>()?;
            Ok(Arc::new(A))
        })
        .transient_with::<B>(|injector| {
            injector.resolve::<A>()?;
            Ok(Arc::new(B))
        })
        .build()
        .unwrap();

    match container.resolve::<A>() {
        Err(KhazinError::CircularDependency(e)) => {
            assert_eq!(e.members(), &[ServiceKey::of::<A>(), ServiceKey::of::<B>()]);
        }
        other => panic!("Expected CircularDependency, got: {:?}", other.err()),
    }
}

#[test]
fn cycle_through_cached_service_does_not_hang() {
    let container = Container::builder()
        .scoped_with::<A>(|injector| {
            injector.resolve::<B>()?;
            Ok(Arc::new(A))
        })
        .scoped_with::<B>(|injector| {
            injector.resolve::<A>()?;
            Ok(Arc::new(B))
        })
        .build()
        .unwrap();

    let scope = container.create_scope(None).unwrap();
    assert!(matches!(
        scope.resolve::<B>(),
        Err(KhazinError::CircularDependency(_))
    ));
}

#[test]
fn declared_cycle_fails_aot_build() {
    let result = Container::builder()
        .resolution_mode(ResolutionMode::Aot)
        .register(ServiceDescriptor::activated::<A>(
            Lifetime::Transient,
            [ServiceKey::of::<B>()],
            |_| Ok(Arc::new(A)),
        ))
        .register(ServiceDescriptor::activated::<B>(
            Lifetime::Transient,
            [ServiceKey::of::<A>()],
            |_| Ok(Arc::new(B)),
        ))
        .build();

    match result {
        Err(KhazinError::CircularDependency(e)) => assert_eq!(e.members().len(), 2),
        other => panic!("Expected CircularDependency, got: {:?}", other.err()),
    }
}

#[test]
fn diamond_shares_the_singleton() {
    let created = Arc::new(AtomicUsize::new(0));
    let container = Container::builder()
        .strict_di(true)
        .resolution_mode(ResolutionMode::Aot)
        .singleton_with::<Leaf>({
            let created = created.clone();
            move |_| {
                created.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Leaf))
            }
        })
        .register(ServiceDescriptor::activated::<Left>(
            Lifetime::Scoped,
            [ServiceKey::of::<Leaf>()],
            |_| Ok(Arc::new(Left)),
        ))
        .register(ServiceDescriptor::activated::<Right>(
            Lifetime::Scoped,
            [ServiceKey::of::<Leaf>()],
            |_| Ok(Arc::new(Right)),
        ))
        .register(ServiceDescriptor::activated::<Top>(
            Lifetime::Transient,
            [ServiceKey::of::<Left>(), ServiceKey::of::<Right>()],
            |_| Ok(Arc::new(Top)),
        ))
        .build()
        .unwrap();

    let scope = container.create_scope(None).unwrap();
    scope.resolve::<Top>().unwrap();
    scope.resolve::<Top>().unwrap();
    assert_eq!(created.load(Ordering::SeqCst), 1);
}

#[test]
fn strict_di_rejects_at_request_time() {
    let container = Container::builder()
        .strict_di(true)
        .singleton_with::<A>(|injector| {
            injector.resolve::<B>()?;
            Ok(Arc::new(A))
        })
        .transient_with::<B>(|_| Ok(Arc::new(B)))
        .build()
        .unwrap();

    match container.resolve::<A>() {
        Err(KhazinError::RequestNotAllowed(e)) => {
            assert_eq!(e.requestor, ServiceKey::of::<A>());
            assert_eq!(e.requestor_lifetime, Lifetime::Singleton);
            assert_eq!(e.requested, ServiceKey::of::<B>());
            assert_eq!(e.requested_lifetime, Lifetime::Transient);
        }
        other => panic!("Expected RequestNotAllowed, got: {:?}", other.err()),
    }
}

#[test]
fn strict_di_allows_equal_and_longer_lifetimes() {
    let container = Container::builder()
        .strict_di(true)
        .scoped_with::<A>(|injector| {
            injector.resolve::<B>()?;
            injector.resolve::<Leaf>()?;
            Ok(Arc::new(A))
        })
        .pooled_with::<B>(|_| Ok(Arc::new(B)))
        .singleton_with::<Leaf>(|_| Ok(Arc::new(Leaf)))
        .build()
        .unwrap();

    let scope = container.create_scope(None).unwrap();
    scope.resolve::<A>().unwrap();
}

#[test]
fn lax_mode_lets_singletons_capture_transients() {
    let container = Container::builder()
        .singleton_with::<A>(|injector| {
            injector.resolve::<B>()?;
            Ok(Arc::new(A))
        })
        .transient_with::<B>(|_| Ok(Arc::new(B)))
        .build()
        .unwrap();

    container.resolve::<A>().unwrap();
}

#[test]
fn strict_di_ignores_requests_made_in_scopes_a_factory_opens() {
    let container = Container::builder()
        .strict_di(true)
        .singleton_with::<A>(|injector| {
            let worker = injector.create_scope(Some("worker"))?;
            worker.resolve::<B>()?;
            Ok(Arc::new(A))
        })
        .scoped_with::<B>(|_| Ok(Arc::new(B)))
        .build()
        .unwrap();

    let scope = container.create_scope(None).unwrap();
    let from_child = scope.resolve::<A>().unwrap();
    let from_root = container.resolve::<A>().unwrap();
    assert!(Arc::ptr_eq(&from_child, &from_root));
}

#[test]
fn strict_di_checks_singletons_against_the_root() {
    let container = Container::builder()
        .strict_di(true)
        .scoped_with::<Top>(|injector| {
            injector.resolve::<A>()?;
            Ok(Arc::new(Top))
        })
        .singleton_with::<A>(|injector| {
            injector.resolve::<B>()?;
            Ok(Arc::new(A))
        })
        .transient_with::<B>(|_| Ok(Arc::new(B)))
        .build()
        .unwrap();

    let scope = container.create_scope(None).unwrap();
    match scope.resolve::<Top>() {
        Err(KhazinError::RequestNotAllowed(e)) => {
            assert_eq!(e.requestor, ServiceKey::of::<A>());
            assert_eq!(e.requested, ServiceKey::of::<B>());
        }
        other => panic!("Expected RequestNotAllowed, got: {:?}", other.err()),
    }
}

#[test]
fn not_registered_names_the_requestor_of_the_same_scope() {
    let container = Container::builder()
        .singleton_with::<A>(|injector| {
            injector.resolve::<Leaf>()?;
            Ok(Arc::new(A))
        })
        .singleton_with::<B>(|injector| {
            injector.create_scope(None)?.resolve::<Leaf>()?;
            Ok(Arc::new(B))
        })
        .build()
        .unwrap();

    match container.resolve::<A>() {
        Err(KhazinError::NotRegistered(e)) => {
            assert_eq!(e.requested, ServiceKey::of::<Leaf>());
            assert_eq!(e.required_by, Some(ServiceKey::of::<A>()));
        }
        other => panic!("Expected NotRegistered, got: {:?}", other.err()),
    }
    match container.resolve::<B>() {
        Err(KhazinError::NotRegistered(e)) => assert_eq!(e.required_by, None),
        other => panic!("Expected NotRegistered, got: {:?}", other.err()),
    }
}

#[test]
fn try_get_is_none_only_for_the_requested_key() {
    let container = Container::builder()
        .transient_with::<A>(|injector| {
            injector.resolve::<B>()?;
            Ok(Arc::new(A))
        })
        .build()
        .unwrap();

    assert!(container.try_resolve::<B>().unwrap().is_none());

    match container.try_resolve::<A>() {
        Err(KhazinError::NotRegistered(e)) => {
            assert_eq!(e.requested, ServiceKey::of::<B>());
            assert_eq!(e.required_by, Some(ServiceKey::of::<A>()));
        }
        other => panic!("Expected NotRegistered for B, got: {:?}", other.err()),
    }
}

#[test]
fn not_registered_suggests_similar_services() {
    struct UserRepository;
    struct UserRepo;

    let container = Container::builder()
        .singleton_value(UserRepository)
        .build()
        .unwrap();

    match container.resolve::<UserRepo>() {
        Err(KhazinError::NotRegistered(e)) => {
            assert!(e.suggestions.iter().any(|s| s.ends_with("UserRepository")));
            assert!(e.to_string().contains("Did you mean"));
        }
        other => panic!("Expected NotRegistered, got: {:?}", other.err()),
    }
}

#[test]
fn trait_objects_resolve() {
    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }
    struct English;
    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".into()
        }
    }

    let container = Container::builder()
        .instance(Arc::new(English) as Arc<dyn Greeter>)
        .build()
        .unwrap();

    let greeter: Arc<dyn Greeter> = container.resolve().unwrap();
    assert_eq!(greeter.greet(), "hello");
    assert!(matches!(
        container.resolve::<English>(),
        Err(KhazinError::NotRegistered(_))
    ));
}

#[test]
fn generic_specializations_are_distinct_and_cached() {
    struct Repository;
    let specialized = Arc::new(AtomicUsize::new(0));
    let definition = GenericDefinition::of::<Repository>();

    let container = Container::builder()
        .generic(definition, Lifetime::Singleton, {
            let specialized = specialized.clone();
            move |arguments| {
                specialized.fetch_add(1, Ordering::SeqCst);
                let table = arguments[0].to_string();
                Ok(Specialization::factory(move |_, _| {
                    Ok(Instance::from_value(table.clone()))
                }))
            }
        })
        .build()
        .unwrap();

    let users = ServiceKey::new(definition.construct([ServiceType::of::<u32>()]), None);
    let orders = ServiceKey::new(definition.construct([ServiceType::of::<u64>()]), None);

    let a: Arc<String> = container.resolve_key(&users).unwrap();
    let b: Arc<String> = container.resolve_key(&users).unwrap();
    let c: Arc<String> = container.resolve_key(&orders).unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(a.as_str(), "u32");
    assert_eq!(c.as_str(), "u64");
    assert_eq!(specialized.load(Ordering::SeqCst), 2);

    let open = ServiceKey::new(definition.open(), None);
    assert!(matches!(
        container.get(&open),
        Err(KhazinError::OpenGenericRequested { .. })
    ));
}

#[test]
fn generic_dependencies_are_specialized_during_build() {
    struct Repository;
    struct Service;
    let definition = GenericDefinition::of::<Repository>();
    let users = ServiceKey::new(definition.construct([ServiceType::of::<u32>()]), None);

    let container = Container::builder()
        .resolution_mode(ResolutionMode::Aot)
        .generic(definition, Lifetime::Scoped, |_| {
            Ok(Specialization::factory(|_, _| Ok(Instance::from_value(0u8))))
        })
        .register(ServiceDescriptor::activated::<Service>(
            Lifetime::Transient,
            [users.clone()],
            |args| {
                args.get::<u8>(0)?;
                Ok(Arc::new(Service))
            },
        ))
        .build()
        .unwrap();

    assert!(container.entries().try_get(&users).is_some());
    let scope = container.create_scope(None).unwrap();
    scope.resolve::<Service>().unwrap();
}

#[test]
fn entry_snapshots_are_immutable() {
    struct Repository;
    let definition = GenericDefinition::of::<Repository>();
    let container = Container::builder()
        .generic(definition, Lifetime::Transient, |_| {
            Ok(Specialization::factory(|_, _| Ok(Instance::from_value(1u8))))
        })
        .build()
        .unwrap();

    let before = container.entries();
    let key = ServiceKey::new(definition.construct([ServiceType::of::<bool>()]), None);
    container.get(&key).unwrap();

    assert!(before.try_get(&key).is_none());
    assert_eq!(container.entries().len(), before.len() + 1);
}

#[test]
fn lookup_engines_agree() {
    for engine in [LookupEngine::Dict, LookupEngine::Tree, LookupEngine::Auto] {
        let mut builder = Container::builder().engine(engine);
        let names: Vec<&'static str> = (0..64)
            .map(|i| &*Box::leak(format!("service-{i}").into_boxed_str()))
            .collect();
        for (i, &name) in names.iter().enumerate() {
            builder = builder.register(ServiceDescriptor::instance(Arc::new(i)).named(name));
        }
        let container = builder.build().unwrap();

        assert_eq!(container.entries().is_tree(), engine != LookupEngine::Dict);
        for (i, &name) in names.iter().enumerate() {
            let value: Arc<usize> = container.resolve_named(name).unwrap();
            assert_eq!(*value, i);
        }
    }
}

#[test]
fn activator_type_mismatch_is_reported() {
    let container = Container::builder()
        .singleton_value(1u8)
        .register(ServiceDescriptor::activated::<A>(
            Lifetime::Transient,
            [ServiceKey::of::<u8>()],
            |args| {
                args.get::<u16>(0)?;
                Ok(Arc::new(A))
            },
        ))
        .build()
        .unwrap();

    assert!(matches!(
        container.resolve::<A>(),
        Err(KhazinError::TypeMismatch { .. })
    ));
}

#[test]
fn providers_and_closure_compiler_work_together() {
    struct Greetings;
    impl Provider for Greetings {
        fn register(&self, registry: &mut dyn ProviderRegistry) {
            registry.register(ServiceDescriptor::transient::<String>(|_| {
                Ok(Arc::new(String::from("hello")))
            }));
        }
    }

    let container = Container::builder()
        .compiler(khazin_container::compiler::ClosureCompiler)
        .add_provider(&Greetings)
        .decorate::<String>(|_, inner| Ok(Arc::new(format!("{inner}!"))))
        .build()
        .unwrap();

    let greeting: Arc<String> = container.resolve().unwrap();
    assert_eq!(greeting.as_str(), "hello!");
}

#[test]
fn instances_cannot_be_decorated() {
    let result = Container::builder()
        .singleton_value(String::from("fixed"))
        .decorate::<String>(|_, inner| Ok(inner))
        .build();
    assert!(matches!(result, Err(KhazinError::InvalidRegistration { .. })));
}
