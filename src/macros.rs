/// Declares a contract: a trait whose methods are called on a remote hub.
///
/// Required methods take `&self` and return `Completion` (no payload) or
/// `Completion<T>` (one payload). They are implemented by the generated
/// proxy, which calls the remote method of the same name. A trailing
/// `CancellationToken` parameter is forwarded to the connection.
///
/// Methods with a default body are kept as written and never dispatched.
///
/// Listing `HubProxy` as the supertrait makes `connection()` available on the
/// client, returning the connection the proxy was built on.
///
/// ```ignore
/// hubproxy::contract! {
///     pub trait Calculator: HubProxy {
///         fn ping(&self) -> Completion;
///         fn add(&self, a: i64, b: i64) -> Completion<i64>;
///         fn sleep(&self, ms: i64, cancel: CancellationToken) -> Completion;
///
///         fn describe(&self) -> String {
///             "calculator".into()
///         }
///     }
/// }
///
/// let calc = hubproxy::create_proxy::<dyn Calculator>(&connection)?;
/// assert_eq!(calc.add(2, 3).await?, 5);
/// ```
#[macro_export]
macro_rules! contract {
    (
        $(#[$meta:meta])*
        $vis:vis trait $name:ident : HubProxy { $($body:tt)* }
    ) => {
        $crate::__contract! {
            @munch [hub] $name [$(#[$meta])* $vis trait $name]
            []
            []
            [($crate::MemberInfo::connection_accessor())]
            $($body)*
        }
    };
    (
        $(#[$meta:meta])*
        $vis:vis trait $name:ident { $($body:tt)* }
    ) => {
        $crate::__contract! {
            @munch [] $name [$(#[$meta])* $vis trait $name]
            []
            []
            []
            $($body)*
        }
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __contract {
    // fn m(&self, ...) -> Completion<T>;
    (
        @munch $hub:tt $name:ident $head:tt
        [$($decls:tt)*] [$($impls:tt)*] [$($members:tt)*]
        $(#[$attr:meta])*
        fn $method:ident(&$self:ident $(, $arg:ident : $ty:ty)*) -> Completion<$payload:ty>;
        $($rest:tt)*
    ) => {
        $crate::__contract! {
            @munch $hub $name $head
            [
                $($decls)*
                $(#[$attr])*
                fn $method(&$self $(, $arg: $ty)*) -> $crate::Completion<$payload>;
            ]
            [
                $($impls)*
                fn $method(&$self $(, $arg: $ty)*) -> $crate::Completion<$payload> {
                    $self.proxy.call_typed::<$payload>(
                        stringify!($method),
                        ::std::vec![$($crate::Argument::into_arg($arg)),*],
                    )
                }
            ]
            [
                $($members)*
                ($crate::MemberInfo::method(
                    stringify!($method),
                    ::std::vec![$(<$ty as $crate::Argument>::param_type()),*],
                    $crate::ReturnShape::payload::<$payload>(),
                ))
            ]
            $($rest)*
        }
    };

    // fn m(&self, ...) -> Completion;
    (
        @munch $hub:tt $name:ident $head:tt
        [$($decls:tt)*] [$($impls:tt)*] [$($members:tt)*]
        $(#[$attr:meta])*
        fn $method:ident(&$self:ident $(, $arg:ident : $ty:ty)*) -> Completion;
        $($rest:tt)*
    ) => {
        $crate::__contract! {
            @munch $hub $name $head
            [
                $($decls)*
                $(#[$attr])*
                fn $method(&$self $(, $arg: $ty)*) -> $crate::Completion;
            ]
            [
                $($impls)*
                fn $method(&$self $(, $arg: $ty)*) -> $crate::Completion {
                    $self.proxy.call_bare(
                        stringify!($method),
                        ::std::vec![$($crate::Argument::into_arg($arg)),*],
                    )
                }
            ]
            [
                $($members)*
                ($crate::MemberInfo::method(
                    stringify!($method),
                    ::std::vec![$(<$ty as $crate::Argument>::param_type()),*],
                    $crate::ReturnShape::Bare,
                ))
            ]
            $($rest)*
        }
    };

    // fn m(&self, ...) -> R { ... }
    (
        @munch $hub:tt $name:ident $head:tt
        [$($decls:tt)*] [$($impls:tt)*] [$($members:tt)*]
        $(#[$attr:meta])*
        fn $method:ident(&$self:ident $(, $arg:ident : $ty:ty)*) $(-> $ret:ty)? $body:block
        $($rest:tt)*
    ) => {
        $crate::__contract! {
            @munch $hub $name $head
            [
                $($decls)*
                $(#[$attr])*
                fn $method(&$self $(, $arg: $ty)*) $(-> $ret)? $body
            ]
            [$($impls)*]
            [
                $($members)*
                ($crate::MemberInfo::provided(stringify!($method)))
            ]
            $($rest)*
        }
    };

    (
        @munch $hub:tt $name:ident $head:tt $decls:tt $impls:tt $members:tt
        $(#[$attr:meta])*
        fn $method:ident $($rest:tt)*
    ) => {
        ::std::compile_error!(::std::concat!(
            "contract method `",
            ::std::stringify!($method),
            "` must take `&self` and return `Completion` or `Completion<T>`, or have a default body",
        ));
    };

    (
        @munch [hub] $name:ident [$($head:tt)*]
        [$($decls:tt)*] [$($impls:tt)*] [$($members:tt)*]
    ) => {
        $($head)*: $crate::HubProxy + ::std::marker::Send + ::std::marker::Sync {
            $($decls)*
        }

        impl $crate::Contract for dyn $name {
            type Client = ::std::boxed::Box<dyn $name>;

            fn describe() -> $crate::ContractInfo {
                let mut info = $crate::ContractInfo::new(stringify!($name));
                $(info.push $members;)*
                info
            }

            fn bind(proxy: $crate::Proxy) -> Self::Client {
                struct Client {
                    proxy: $crate::Proxy,
                }

                impl $name for Client {
                    $($impls)*
                }

                impl $crate::HubProxy for Client {
                    fn connection(&self) -> &::std::sync::Arc<dyn $crate::Connection> {
                        self.proxy.connection()
                    }
                }

                ::std::boxed::Box::new(Client { proxy })
            }
        }
    };

    (
        @munch [] $name:ident [$($head:tt)*]
        [$($decls:tt)*] [$($impls:tt)*] [$($members:tt)*]
    ) => {
        $($head)*: ::std::marker::Send + ::std::marker::Sync {
            $($decls)*
        }

        impl $crate::Contract for dyn $name {
            type Client = ::std::boxed::Box<dyn $name>;

            fn describe() -> $crate::ContractInfo {
                #[allow(unused_mut)]
                let mut info = $crate::ContractInfo::new(stringify!($name));
                $(info.push $members;)*
                info
            }

            fn bind(proxy: $crate::Proxy) -> Self::Client {
                #[allow(dead_code)]
                struct Client {
                    proxy: $crate::Proxy,
                }

                impl $name for Client {
                    $($impls)*
                }

                ::std::boxed::Box::new(Client { proxy })
            }
        }
    };
}
