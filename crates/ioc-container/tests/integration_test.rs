use ioc_container::*;
use std::sync::Arc;

pub struct ADependency {
    foo: bool,
}

pub struct AnotherDependency {
    foo: bool,
    that: String,
}

pub struct DependencyProvider;

pub struct SomeClass {
    dependency: Arc<ADependency>,
    another_dependency: Arc<AnotherDependency>,
}

pub struct Flag {
    on: bool,
}

pub struct Wrapper {
    flag: Arc<Flag>,
}

pub struct Pair {
    left: i32,
    right: i32,
}

pub struct Calculator;

pub trait Greeter: Send + Sync {
    fn greet(&self) -> String;
}

pub struct English;

impl Greeter for English {
    fn greet(&self) -> String {
        "hello".to_string()
    }
}

pub struct Host {
    greeter: Arc<dyn Greeter>,
}

fn fixtures(registry: &mut ClassRegistry) {
    registry
        .register(
            ClassDefinition::new(|args| Ok(ADependency { foo: args.value("foo")? }))
                .constructor([Descriptor::parameter::<bool>("foo")])
                .provided_by::<DependencyProvider>(),
        )
        .register(
            ClassDefinition::new(|args| {
                Ok(AnotherDependency {
                    foo: args.value("foo")?,
                    that: args.value("that")?,
                })
            })
            .constructor([
                Descriptor::parameter::<bool>("foo"),
                Descriptor::parameter::<String>("that"),
            ])
            .provided_by::<DependencyProvider>(),
        )
        .register(
            ClassDefinition::new(|_| Ok(DependencyProvider))
                .method(
                    MethodDefinition::associated("provide_a_dependency", |_| Ok(ADependency { foo: false }))
                        .resolves_inferred()
                        .shared(),
                )
                .method(
                    MethodDefinition::instance("provide_another_dependency", |_: &DependencyProvider, _| {
                        Ok(AnotherDependency {
                            foo: true,
                            that: "yes".to_string(),
                        })
                    })
                    .resolves_inferred(),
                ),
        )
        .register(
            ClassDefinition::new(|args| {
                Ok(SomeClass {
                    dependency: args.instance("dependency")?,
                    another_dependency: args.instance("another_dependency")?,
                })
            })
            .inject(Descriptor::property::<ADependency>("dependency"))
            .constructor([Descriptor::parameter::<AnotherDependency>("another_dependency")])
            .inject_constructor(),
        )
        .register(
            ClassDefinition::new(|args| Ok(Flag { on: args.value("on")? }))
                .constructor([Descriptor::parameter::<bool>("on")]),
        )
        .register(
            ClassDefinition::new(|args| Ok(Wrapper { flag: args.instance("flag")? }))
                .constructor([Descriptor::parameter::<Flag>("flag")]),
        )
        .register(
            ClassDefinition::new(|args| {
                Ok(Pair {
                    left: args.value("left")?,
                    right: args.value("right")?,
                })
            })
            .constructor([
                Descriptor::parameter::<i32>("left"),
                Descriptor::parameter::<i32>("right").with_default(0_i32),
            ]),
        )
        .register(
            ClassDefinition::new(|_| Ok(Calculator)).method(
                MethodDefinition::instance("add", |_: &Calculator, args| {
                    Ok(args.value::<i32>("a")? + args.value::<i32>("b")?)
                })
                .parameters([
                    Descriptor::parameter::<i32>("a"),
                    Descriptor::parameter::<i32>("b"),
                ]),
            ),
        )
        .register(
            ClassDefinition::new(|_| Ok(English))
                .implements(|english: Arc<English>| english as Arc<dyn Greeter>),
        )
        .register(
            ClassDefinition::new(|args| Ok(Host { greeter: args.value("greeter")? }))
                .constructor([Descriptor::parameter::<Arc<dyn Greeter>>("greeter")]),
        );
}

fn container() -> Container {
    Container::new(fixtures)
}

fn key<T: ?Sized + 'static>() -> TypeKey {
    TypeKey::of::<T>()
}

fn make(container: &mut Container, type_key: TypeKey) -> Value {
    container.make(type_key, Arguments::new()).unwrap().unwrap()
}

#[test]
fn correctly_binds_closure_resolvers() {
    let mut container = container();
    container
        .bind(
            key::<ADependency>(),
            Some(Concrete::factory(|_, _| Ok(ADependency { foo: false }))),
            false,
        )
        .unwrap();

    let resolver = container.resolver(key::<ADependency>()).unwrap();
    assert!(resolver.as_any().is::<ClosureResolver>());

    let dependency: Arc<ADependency> = container.resolve().unwrap();
    assert!(!dependency.foo);
}

#[test]
fn returns_same_instance_when_dependency_marked_as_shared() {
    let mut container = container();
    container
        .bind(key::<Flag>(), Some(Concrete::factory(|_, _| Ok(Flag { on: true }))), true)
        .unwrap();

    let first = make(&mut container, key::<Flag>());
    let second = make(&mut container, key::<Flag>());

    assert!(first.ptr_eq(&second));
}

#[test]
fn returns_different_instance_when_dependency_not_marked_as_shared() {
    let mut container = container();
    container
        .bind(key::<Flag>(), Some(Concrete::factory(|_, _| Ok(Flag { on: true }))), false)
        .unwrap();

    let first = make(&mut container, key::<Flag>());
    let second = make(&mut container, key::<Flag>());

    assert!(!first.ptr_eq(&second));
}

#[test]
fn fresh_resolutions_do_not_disturb_the_shared_instance() {
    let mut container = container();
    container
        .bind(key::<Flag>(), Some(Concrete::factory(|_, _| Ok(Flag { on: false }))), true)
        .unwrap();

    let fresh_one = container.make_with(key::<Flag>(), Arguments::new(), true, false).unwrap().unwrap();
    let fresh_two = container.make_with(key::<Flag>(), Arguments::new(), true, false).unwrap().unwrap();
    assert!(!fresh_one.ptr_eq(&fresh_two));

    let cached = make(&mut container, key::<Flag>());
    assert!(!cached.ptr_eq(&fresh_one));
    assert!(!cached.ptr_eq(&fresh_two));

    let fresh_three = container.make_with(key::<Flag>(), Arguments::new(), true, false).unwrap().unwrap();
    assert!(!fresh_three.ptr_eq(&cached));
    assert!(make(&mut container, key::<Flag>()).ptr_eq(&cached));
}

#[test]
fn can_automatically_register_providers() {
    let mut container = container();
    let a_dependency: Arc<ADependency> = container.resolve().unwrap();

    assert!(container.has_provider(key::<DependencyProvider>()));
    assert!(container.has_binding(key::<ADependency>()));
    assert!(container.has_binding(key::<AnotherDependency>()));
    assert!(!a_dependency.foo);
}

#[test]
fn can_manually_register_providers() {
    let mut container = container();
    container.provider(key::<DependencyProvider>()).unwrap();

    assert!(container.has_provider(key::<DependencyProvider>()));
    assert!(container.has_binding(key::<ADependency>()));
    assert!(container.has_binding(key::<AnotherDependency>()));
    assert!(container.has_binding(key::<DependencyProvider>()));

    let resolver = container.resolver(key::<ADependency>()).unwrap();
    assert!(resolver.is_shared());
    let method = resolver.as_any().downcast_ref::<MethodResolver>().unwrap();
    assert_eq!(method.method(), "provide_a_dependency");
}

#[test]
fn provider_bindings_honour_shared_markers() {
    let mut container = container();
    container.provider(key::<DependencyProvider>()).unwrap();

    let a1 = make(&mut container, key::<ADependency>());
    let a2 = make(&mut container, key::<ADependency>());
    assert!(a1.ptr_eq(&a2));

    let b1 = make(&mut container, key::<AnotherDependency>());
    let b2 = make(&mut container, key::<AnotherDependency>());
    assert!(!b1.ptr_eq(&b2));

    let another = b1.downcast::<AnotherDependency>().unwrap();
    assert!(another.foo);
    assert_eq!(another.that, "yes");

    // one provider instance serves every instance method
    let p1 = make(&mut container, key::<DependencyProvider>());
    let p2 = make(&mut container, key::<DependencyProvider>());
    assert!(p1.ptr_eq(&p2));
}

#[test]
fn explicit_provided_types_alias_to_the_first() {
    trait Transport: Send + Sync {
        fn name(&self) -> &'static str;
    }
    struct Smtp;
    impl Transport for Smtp {
        fn name(&self) -> &'static str {
            "smtp"
        }
    }
    struct Mailer;
    struct MailProvider;

    let mut container = Container::new(|registry| {
        registry.register(ClassDefinition::new(|_| Ok(MailProvider)).method(
            MethodDefinition::associated("transport", |_| Ok(Arc::new(Smtp) as Arc<dyn Transport>))
                .resolves([key::<Arc<dyn Transport>>(), key::<Mailer>()])
                .shared(),
        ));
    });
    container.provider(key::<MailProvider>()).unwrap();

    assert!(container.has_binding(key::<Mailer>()));
    assert!(!container.has_binding(key::<MailProvider>()));

    let via_alias = make(&mut container, key::<Mailer>());
    let direct = make(&mut container, key::<Arc<dyn Transport>>());
    assert!(via_alias.ptr_eq(&direct));

    let transport: Arc<Arc<dyn Transport>> = container.resolve().unwrap();
    assert_eq!(transport.name(), "smtp");
}

#[test]
fn aliases_behave_like_their_target() {
    struct Settings;
    struct LegacySettings;

    let mut container = Container::new(|registry| {
        registry.register(ClassDefinition::new(|_| Ok(Settings)));
    });
    container.bind(key::<Settings>(), None, true).unwrap();
    container.alias(key::<Settings>(), [key::<LegacySettings>()]);

    assert!(container.has_binding(key::<LegacySettings>()));
    let via_alias = make(&mut container, key::<LegacySettings>());
    let direct = make(&mut container, key::<Settings>());
    assert!(via_alias.ptr_eq(&direct));
    assert!(via_alias.is::<Settings>());
}

#[test]
fn binding_an_alias_replaces_the_redirect() {
    struct Settings;
    struct Other;

    let mut container = Container::new(|registry| {
        registry
            .register(ClassDefinition::new(|_| Ok(Settings)))
            .register(ClassDefinition::new(|_| Ok(Other)));
    });
    container.alias(key::<Settings>(), [key::<Other>()]);
    container.bind(key::<Other>(), None, false).unwrap();

    assert!(make(&mut container, key::<Other>()).is::<Other>());
}

#[test]
fn injects_properties_and_constructor_parameters() {
    let mut container = container();
    let some: Arc<SomeClass> = container.resolve().unwrap();

    assert!(!some.dependency.foo);
    assert_eq!(some.another_dependency.that, "yes");

    let targets = container.metadata().inject_targets(key::<SomeClass>());
    assert!(targets.constructor_marked);
    assert_eq!(targets.properties.len(), 1);
}

#[test]
fn named_arguments_take_priority_over_positional_ones() {
    let mut container = container();
    let arguments = Arguments::new()
        .with(0_usize, 1_i32)
        .with("left", 5_i32)
        .with(1_usize, 7_i32);

    let pair: Arc<Pair> = container.resolve_with(arguments).unwrap();

    assert_eq!(pair.left, 5);
    assert_eq!(pair.right, 7);
}

#[test]
fn defaults_fill_unsupplied_scalars() {
    let mut container = container();
    let pair: Arc<Pair> = container.resolve_with(Arguments::new().with("left", 3_i32)).unwrap();

    assert_eq!(pair.left, 3);
    assert_eq!(pair.right, 0);
}

#[test]
fn nested_argument_bags_construct_the_parameter_type() {
    let mut container = container();
    let arguments = Arguments::new().with_bag("flag", Arguments::new().with("on", true));

    let wrapper: Arc<Wrapper> = container.resolve_with(arguments).unwrap();

    assert!(wrapper.flag.on);
}

#[test]
fn mistyped_arguments_are_rejected() {
    let mut container = container();
    let result = container.make(key::<Flag>(), Arguments::new().with("on", "yes"));

    assert!(matches!(result, Err(Error::InvalidArgument(_))));
}

#[test]
fn arity_is_enforced_when_autowiring_is_disabled() {
    let mut container = container();
    container.disable_autowiring();
    assert!(!container.should_autowire());

    let missing = container.make(key::<Flag>(), Arguments::new());
    assert!(matches!(missing, Err(Error::InvalidArgument(_))));

    let extra = container.make(key::<Flag>(), Arguments::new().with("on", true).with("extra", 1_u8));
    assert!(matches!(extra, Err(Error::InvalidArgument(_))));

    let flag: Arc<Flag> = container.resolve_with(Arguments::new().with("on", true)).unwrap();
    assert!(flag.on);

    // properties count towards the total
    let partial = container.make(
        key::<SomeClass>(),
        Arguments::new().with("dependency", ADependency { foo: true }),
    );
    assert!(matches!(partial, Err(Error::InvalidArgument(_))));

    let some: Arc<SomeClass> = container
        .resolve_with(
            Arguments::new()
                .with("dependency", ADependency { foo: true })
                .with(
                    "another_dependency",
                    AnotherDependency {
                        foo: false,
                        that: "manual".to_string(),
                    },
                ),
        )
        .unwrap();
    assert!(some.dependency.foo);
    assert_eq!(some.another_dependency.that, "manual");

    container.enable_autowiring();
    assert!(container.make(key::<SomeClass>(), Arguments::new()).is_ok());
}

#[test]
fn builder_configures_autowiring() {
    let mut builder = Container::build();
    builder
        .register(ClassDefinition::new(|args| Ok(Flag { on: args.value("on")? })).constructor([
            Descriptor::parameter::<bool>("on"),
        ]))
        .autowiring(false);
    let mut container = builder.finalize();

    assert!(!container.should_autowire());
    assert!(matches!(
        container.make(key::<Flag>(), Arguments::new()),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn calls_methods_with_resolved_arguments() {
    let mut container = container();
    let sum = container
        .call(key::<Calculator>(), "add", Arguments::new().with("b", 2_i32).with(0_usize, 40_i32))
        .unwrap()
        .unwrap();

    assert_eq!(sum.downcast_ref::<i32>(), Some(&42));
    assert!(container.has_binding(key::<Calculator>()));
}

#[test]
fn method_resolvers_require_an_existing_method() {
    let mut container = container();

    let call = container.call(key::<Calculator>(), "subtract", Arguments::new());
    assert!(matches!(call, Err(Error::InvalidResolver(_))));

    let bind = container.bind(
        key::<i32>(),
        Some(Concrete::method(key::<Calculator>(), "subtract")),
        false,
    );
    assert!(matches!(bind, Err(Error::InvalidResolver(_))));
    assert!(!container.has_binding(key::<i32>()));
}

#[test]
fn unknown_types_are_reported() {
    struct Unknown;
    let mut container = container();

    assert!(matches!(
        container.make(key::<Unknown>(), Arguments::new()),
        Err(Error::UnregisteredType(_))
    ));
    assert!(matches!(container.bind(key::<Unknown>(), None, false), Err(Error::InvalidResolver(_))));
    assert!(matches!(container.provider(key::<Unknown>()), Err(Error::InvalidProvider(_))));
    assert!(matches!(container.provider(key::<Flag>()), Err(Error::InvalidProvider(_))));
    assert!(!container.has_provider(key::<Flag>()));
}

#[test]
fn circular_dependencies_fail_fast() {
    struct Chicken;
    struct Egg;

    let mut container = Container::new(|registry| {
        registry
            .register(
                ClassDefinition::new(|args| {
                    args.instance::<Egg>("egg")?;
                    Ok(Chicken)
                })
                .constructor([Descriptor::parameter::<Egg>("egg")]),
            )
            .register(
                ClassDefinition::new(|args| {
                    args.instance::<Chicken>("chicken")?;
                    Ok(Egg)
                })
                .constructor([Descriptor::parameter::<Chicken>("chicken")]),
            );
    });

    match container.make(key::<Chicken>(), Arguments::new()) {
        Err(Error::CircularDependency(path)) => assert_eq!(path.len(), 3),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!container.has_binding(key::<Chicken>()));
    assert!(!container.has_binding(key::<Egg>()));
}

#[test]
fn failed_resolution_leaves_the_registry_untouched() {
    struct Broken;

    let mut container = Container::new(|registry| {
        fixtures(registry);
        registry.register(ClassDefinition::new(|_| -> ProvideResult<Broken> {
            anyhow::bail!("cannot build")
        }));
    });
    container.provider(key::<DependencyProvider>()).unwrap();

    match container.make(key::<Broken>(), Arguments::new()) {
        Err(Error::Service(err)) => assert_eq!(err.to_string(), "cannot build"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!container.has_binding(key::<Broken>()));
    assert!(container.has_binding(key::<ADependency>()));
}

#[test]
fn closures_receive_the_raw_argument_bag() {
    let mut container = container();
    container
        .bind(
            key::<String>(),
            Some(Concrete::closure(|container, arguments| {
                let flag: Arc<Flag> = container.resolve_with(Arguments::new().with("on", true))?;
                let suffix = arguments.value::<&'static str>(0_usize).map(|s| *s).unwrap_or("none");
                Ok(Some(Value::new(format!("{}-{}", flag.on, suffix))))
            })),
            false,
        )
        .unwrap();

    let built: Arc<String> = container.resolve_with(Arguments::new().with(0_usize, "x")).unwrap();
    assert_eq!(built.as_str(), "true-x");
}

#[test]
fn prebuilt_instances_are_shared() {
    let mut container = container();
    let value = Value::new(Flag { on: true });
    container.instance(key::<Flag>(), value.clone());

    assert!(make(&mut container, key::<Flag>()).ptr_eq(&value));
    assert!(container.resolver(key::<Flag>()).unwrap().is_shared());
}

#[test]
fn custom_resolvers_are_used_as_is() {
    struct Fixed;

    impl Resolver for Fixed {
        fn is_shared(&self) -> bool {
            false
        }

        fn resolve(&self, _: &mut Container, _: Arguments, _: bool) -> Result<Option<Value>> {
            Ok(Some(Value::new(11_u64)))
        }

        fn as_any(&self) -> &dyn std::any::Any {
            self
        }
    }

    let mut container = container();
    container.bind(key::<u64>(), Some(Concrete::resolver(Fixed)), true).unwrap();

    let resolver = container.resolver(key::<u64>()).unwrap();
    assert!(!resolver.is_shared());
    assert!(resolver.as_any().is::<Fixed>());
    assert_eq!(*container.resolve::<u64>().unwrap(), 11);
}

#[test]
fn resolve_reports_type_mismatches() {
    let mut container = container();
    container
        .bind(key::<u8>(), Some(Concrete::factory(|_, _| Ok(1_u16))), false)
        .unwrap();

    assert!(matches!(container.resolve::<u8>(), Err(Error::TypeMismatch { .. })));
}

#[test]
fn interfaces_bound_to_classes_resolve_and_autowire() {
    let mut container = container();
    container
        .bind(key::<Arc<dyn Greeter>>(), Some(Concrete::class::<English>()), true)
        .unwrap();

    let resolver = container.resolver(key::<Arc<dyn Greeter>>()).unwrap();
    let class = resolver.as_any().downcast_ref::<ClassResolver>().unwrap();
    assert_eq!(class.abstract_type(), key::<Arc<dyn Greeter>>());
    assert_eq!(class.class(), key::<English>());

    let greeter: Arc<Arc<dyn Greeter>> = container.resolve().unwrap();
    assert_eq!(greeter.greet(), "hello");
    assert!(Arc::ptr_eq(&greeter, &container.resolve().unwrap()));

    let host: Arc<Host> = container.resolve().unwrap();
    assert_eq!(host.greeter.greet(), "hello");
    assert!(Arc::ptr_eq(&host.greeter, &*greeter));

    // the class itself is still available under its own key
    let english = make(&mut container, key::<English>());
    assert!(english.is::<English>());
}

#[test]
fn interfaces_bound_to_provided_classes_go_through_the_provider() {
    trait Transport: Send + Sync {
        fn name(&self) -> &'static str;
    }
    struct Smtp;
    impl Transport for Smtp {
        fn name(&self) -> &'static str {
            "smtp"
        }
    }
    struct MailProvider;

    let mut container = Container::new(|registry| {
        registry
            .register(
                ClassDefinition::new(|_| Ok(Smtp))
                    .provided_by::<MailProvider>()
                    .implements(|smtp: Arc<Smtp>| smtp as Arc<dyn Transport>),
            )
            .register(ClassDefinition::new(|_| Ok(MailProvider)).method(
                MethodDefinition::associated("smtp", |_| Ok(Smtp)).resolves_inferred().shared(),
            ));
    });
    container
        .bind(key::<Arc<dyn Transport>>(), Some(Concrete::class::<Smtp>()), false)
        .unwrap();

    assert!(container.has_provider(key::<MailProvider>()));
    assert!(container.has_binding(key::<Smtp>()));

    let transport: Arc<Arc<dyn Transport>> = container.resolve().unwrap();
    assert_eq!(transport.name(), "smtp");

    let smtp_one = make(&mut container, key::<Smtp>());
    let smtp_two = make(&mut container, key::<Smtp>());
    assert!(smtp_one.ptr_eq(&smtp_two));
}

#[test]
fn registering_a_provider_again_rebinds_its_types() {
    let mut container = container();
    container.provider(key::<DependencyProvider>()).unwrap();

    let first = make(&mut container, key::<ADependency>());
    assert!(first.ptr_eq(&make(&mut container, key::<ADependency>())));

    container.provider(key::<DependencyProvider>()).unwrap();

    let second = make(&mut container, key::<ADependency>());
    assert!(!first.ptr_eq(&second));
    assert!(second.ptr_eq(&make(&mut container, key::<ADependency>())));
}

#[test]
fn method_arity_is_enforced_when_autowiring_is_disabled() {
    let mut container = container();
    container.disable_autowiring();

    match container.call(key::<Calculator>(), "add", Arguments::new().with("a", 1_i32)) {
        Err(Error::InvalidArgument(message)) => {
            assert!(message.ends_with("add has 2 parameters, 1 arguments provided"), "{message}")
        }
        other => panic!("unexpected result: {other:?}"),
    }

    let sum = container
        .call(key::<Calculator>(), "add", Arguments::new().with("a", 1_i32).with("b", 2_i32))
        .unwrap()
        .unwrap();
    assert_eq!(sum.downcast_ref::<i32>(), Some(&3));
}

#[test]
fn method_owners_are_built_without_the_call_arguments() {
    struct Counter {
        start: i32,
    }

    let mut container = Container::new(|registry| {
        registry.register(
            ClassDefinition::new(|args| Ok(Counter { start: args.value("start")? }))
                .constructor([Descriptor::parameter::<i32>("start").with_default(0_i32)])
                .method(
                    MethodDefinition::instance("next", |counter: &Counter, args| {
                        Ok(counter.start + args.value::<i32>("step")?)
                    })
                    .parameters([Descriptor::parameter::<i32>("step")]),
                ),
        );
    });

    let next = container
        .call(key::<Counter>(), "next", Arguments::new().with("start", 10_i32).with("step", 1_i32))
        .unwrap()
        .unwrap();

    assert_eq!(next.downcast_ref::<i32>(), Some(&1));
}

#[test]
fn nested_failures_roll_back_provider_discovery() {
    struct Faulty;
    struct FaultyProvider;
    struct Consumer;

    let mut container = Container::new(|registry| {
        registry
            .register(ClassDefinition::new(|_| Ok(Faulty)).provided_by::<FaultyProvider>())
            .register(ClassDefinition::new(|_| Ok(FaultyProvider)).method(
                MethodDefinition::associated("faulty", |_| -> ProvideResult<Faulty> {
                    anyhow::bail!("offline")
                })
                .resolves_inferred(),
            ))
            .register(
                ClassDefinition::new(|args| {
                    args.instance::<Faulty>("faulty")?;
                    Ok(Consumer)
                })
                .constructor([Descriptor::parameter::<Faulty>("faulty")]),
            );
    });

    match container.make(key::<Consumer>(), Arguments::new()) {
        Err(Error::Service(err)) => assert_eq!(err.to_string(), "offline"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert!(!container.has_provider(key::<FaultyProvider>()));
    assert!(!container.has_binding(key::<Faulty>()));
    assert!(!container.has_binding(key::<Consumer>()));

    // the container stays usable after the restore
    container.bind(key::<Faulty>(), Some(Concrete::factory(|_, _| Ok(Faulty))), false).unwrap();
    assert!(container.make(key::<Consumer>(), Arguments::new()).is_ok());
}
